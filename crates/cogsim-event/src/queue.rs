//! TaskQueue - bounded single-worker executor for asynchronous delivery.
//!
//! A [`TaskQueue`] owns one worker thread that runs submitted jobs in
//! submission order. Listeners registered with
//! [`DeliveryMode::Async`](crate::DeliveryMode::Async) share a queue, so a
//! slow listener only delays the listeners behind it on the same queue,
//! never the publisher.
//!
//! ```text
//! publish() ──try_submit()──► [ bounded mpsc ] ──► worker thread ──► job()
//!                 │
//!                 └── Full / Closed ──► DispatchError (dropped, not retried)
//! ```
//!
//! The worker exits once the queue is shut down, or once the last handle
//! is dropped, after finishing the jobs already accepted. A panicking job
//! is logged and the worker moves on.

use crate::error::DispatchError;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error};

/// A unit of work run on the queue's worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Shared with the worker, which must never own the sender.
struct QueueState {
    name: String,
    pending: AtomicUsize,
    drained: Notify,
}

impl QueueState {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Cloneable handle to a bounded single-worker queue.
///
/// All clones feed the same worker. [`shutdown`](Self::shutdown) through
/// any clone closes the queue for every clone.
#[derive(Clone)]
pub struct TaskQueue {
    state: Arc<QueueState>,
    tx: Arc<Mutex<Option<mpsc::Sender<Job>>>>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.state.name)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TaskQueue {
    /// Starts a queue with its own worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WorkerSpawn`] if the OS refuses the thread.
    pub fn spawn(name: impl Into<String>, capacity: usize) -> Result<Self, DispatchError> {
        let name = name.into();
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let state = Arc::new(QueueState {
            name: name.clone(),
            pending: AtomicUsize::new(0),
            drained: Notify::new(),
        });

        let worker = Arc::clone(&state);
        std::thread::Builder::new()
            .name(format!("cogsim-queue-{name}"))
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!(queue = %worker.name, "task queue job panicked");
                    }
                    worker.finish_one();
                }
                debug!(queue = %worker.name, "task queue worker exited");
            })
            .map_err(|e| DispatchError::WorkerSpawn {
                queue: name,
                reason: e.to_string(),
            })?;

        Ok(Self {
            state,
            tx: Arc::new(Mutex::new(Some(tx))),
        })
    }

    /// Returns the queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Number of submitted jobs not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Submits a job without waiting.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::QueueFull`] when the queue is at capacity
    /// - [`DispatchError::QueueClosed`] after shutdown
    pub fn try_submit(&self, job: Job) -> Result<(), DispatchError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(DispatchError::QueueClosed {
                queue: self.state.name.clone(),
            });
        };

        // Count before sending so the worker can never decrement first.
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.state.pending.fetch_sub(1, Ordering::AcqRel);
                Err(match err {
                    mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull {
                        queue: self.state.name.clone(),
                    },
                    mpsc::error::TrySendError::Closed(_) => DispatchError::QueueClosed {
                        queue: self.state.name.clone(),
                    },
                })
            }
        }
    }

    /// Closes the queue. Jobs already accepted still run; later
    /// submissions are rejected. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.tx.lock().take().is_some() {
            debug!(queue = %self.state.name, "task queue shut down");
        }
    }

    /// Waits until every accepted job has finished.
    pub async fn idle(&self) {
        loop {
            let drained = self.state.drained.notified();
            if self.pending() == 0 {
                return;
            }
            drained.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    #[tokio::test]
    async fn runs_jobs_in_submission_order() {
        let queue = TaskQueue::spawn("order", 16).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = Arc::clone(&seen);
            queue
                .try_submit(Box::new(move || seen.lock().push(i)))
                .unwrap();
        }

        queue.idle().await;
        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn full_queue_rejects() {
        let queue = TaskQueue::spawn("tiny", 1).unwrap();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let (started_tx, started_rx) = std_mpsc::channel::<()>();

        // Occupies the worker until released.
        queue
            .try_submit(Box::new(move || {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
            }))
            .unwrap();
        started_rx.recv().unwrap();

        // Fills the single buffer slot.
        queue.try_submit(Box::new(|| {})).unwrap();

        let err = queue.try_submit(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, DispatchError::QueueFull { .. }));

        release_tx.send(()).unwrap();
        queue.idle().await;
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_and_is_idempotent() {
        let queue = TaskQueue::spawn("closing", 4).unwrap();
        let clone = queue.clone();
        queue.shutdown();
        queue.shutdown();

        assert!(clone.is_closed());
        let err = clone.try_submit(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, DispatchError::QueueClosed { .. }));
    }

    #[tokio::test]
    async fn idle_returns_immediately_when_empty() {
        let queue = TaskQueue::spawn("empty", 4).unwrap();
        queue.idle().await;
        assert_eq!(queue.name(), "empty");
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_worker() {
        let queue = TaskQueue::spawn("dropped", 4).unwrap();
        let clone = queue.clone();
        let (done_tx, done_rx) = std_mpsc::channel::<()>();
        queue
            .try_submit(Box::new(move || {
                let _ = done_tx.send(());
            }))
            .unwrap();
        let state = Arc::downgrade(&queue.state);

        drop(queue);
        drop(clone);
        done_rx.recv().unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while state.upgrade().is_some() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn panicking_job_does_not_stall_the_queue() {
        let queue = TaskQueue::spawn("panicky", 4).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        queue.try_submit(Box::new(|| panic!("job failed"))).unwrap();
        let counter = Arc::clone(&ran);
        queue
            .try_submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), queue.idle())
            .await
            .unwrap();
        assert_eq!(queue.pending(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&ran);
        queue
            .try_submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        queue.idle().await;
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }
}
