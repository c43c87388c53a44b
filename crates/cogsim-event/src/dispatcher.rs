//! EventDispatcher - fan-out of runtime events to listeners.
//!
//! Every runtime subsystem (scheduler, controller, connector) publishes
//! state transitions through an [`EventDispatcher`] so producers never
//! know who is watching.
//!
//! # Delivery
//!
//! ```text
//!                      ┌── Sync ─────────► listener.on_event(&e)   (caller thread)
//! publish(e) ─snapshot─┤
//!                      └── Async(queue) ─► queue.try_submit(job)   (queue worker)
//! ```
//!
//! - Sync registrations have run before `publish` returns.
//! - Async registrations keep publish order per queue; no order across
//!   queues.
//! - A panicking listener is logged and skipped; the publisher and the
//!   other listeners are unaffected.
//! - A refused submission drops the event for that listener. The first
//!   refusal on a dispatcher logs a warning, the rest only at trace level.
//!
//! # Registration list
//!
//! Copy-on-write: `publish` clones an `Arc` of the current list and walks
//! it without holding the lock, so registration changes never block or
//! disturb an in-flight publication.

use crate::error::DispatchError;
use crate::listener::Listener;
use crate::queue::TaskQueue;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace, warn};

/// How a registration receives events.
#[derive(Debug, Clone, Default)]
pub enum DeliveryMode {
    /// Inline, in the publishing thread.
    #[default]
    Sync,
    /// Submitted as a job to the given queue.
    Async(TaskQueue),
}

impl DeliveryMode {
    /// Returns `true` for [`DeliveryMode::Sync`].
    #[must_use]
    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync)
    }
}

struct Registration<E> {
    listener: Arc<dyn Listener<E>>,
    mode: DeliveryMode,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
            mode: self.mode.clone(),
        }
    }
}

/// Listener registry and event fan-out.
///
/// # Example
///
/// ```
/// use cogsim_event::{listener_fn, EventDispatcher};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let dispatcher = EventDispatcher::<u32>::new("demo");
/// let total = Arc::new(AtomicUsize::new(0));
/// let sum = Arc::clone(&total);
/// dispatcher.register(listener_fn("sum", move |n: &u32| {
///     sum.fetch_add(*n as usize, Ordering::SeqCst);
/// }));
///
/// dispatcher.publish(3);
/// dispatcher.publish(4);
/// assert_eq!(total.load(Ordering::SeqCst), 7);
/// ```
pub struct EventDispatcher<E> {
    source: String,
    registrations: RwLock<Arc<Vec<Registration<E>>>>,
    rejection_warned: AtomicBool,
    rejected: AtomicU64,
}

impl<E> std::fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("source", &self.source)
            .field("listeners", &self.registrations.read().len())
            .field("rejected", &self.rejected.load(Ordering::Relaxed))
            .finish()
    }
}

impl<E> Default for EventDispatcher<E>
where
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new("dispatcher")
    }
}

impl<E> EventDispatcher<E>
where
    E: Send + Sync + 'static,
{
    /// Creates an empty dispatcher. `source` names the publisher in logs.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            registrations: RwLock::new(Arc::new(Vec::new())),
            rejection_warned: AtomicBool::new(false),
            rejected: AtomicU64::new(0),
        }
    }

    /// Returns the publisher name used in logs.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Registers a listener for synchronous delivery.
    pub fn register(&self, listener: Arc<dyn Listener<E>>) {
        self.register_with(listener, DeliveryMode::Sync);
    }

    /// Registers a listener with an explicit delivery mode.
    ///
    /// Registering the same listener twice creates two independent
    /// entries; it will then receive every event twice.
    pub fn register_with(&self, listener: Arc<dyn Listener<E>>, mode: DeliveryMode) {
        let mut guard = self.registrations.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(Registration { listener, mode });
        *guard = Arc::new(next);
    }

    /// Removes every registration of `listener` (compared by identity).
    ///
    /// Returns the number of registrations removed.
    pub fn unregister<L>(&self, listener: &Arc<L>) -> usize
    where
        L: Listener<E> + ?Sized,
    {
        let target = Arc::as_ptr(listener) as *const ();
        let mut guard = self.registrations.write();
        let before = guard.len();
        let next: Vec<Registration<E>> = guard
            .iter()
            .filter(|r| Arc::as_ptr(&r.listener) as *const () != target)
            .cloned()
            .collect();
        let removed = before - next.len();
        if removed > 0 {
            *guard = Arc::new(next);
        }
        removed
    }

    /// Removes all registrations.
    pub fn clear(&self) {
        *self.registrations.write() = Arc::new(Vec::new());
    }

    /// Returns `true` if at least one registration exists.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.registrations.read().is_empty()
    }

    /// Number of registrations (duplicates counted separately).
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// Returns `true` if there are no registrations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_listeners()
    }

    /// Returns the registered listeners in registration order.
    #[must_use]
    pub fn snapshot_listeners(&self) -> Vec<Arc<dyn Listener<E>>> {
        self.registrations
            .read()
            .iter()
            .map(|r| Arc::clone(&r.listener))
            .collect()
    }

    /// Total submissions refused by task queues since creation.
    #[must_use]
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Delivers `event` to every registration.
    pub fn publish(&self, event: E) {
        let snapshot = Arc::clone(&self.registrations.read());
        if snapshot.is_empty() {
            return;
        }

        let event = Arc::new(event);
        for registration in snapshot.iter() {
            match &registration.mode {
                DeliveryMode::Sync => {
                    deliver(registration.listener.as_ref(), &event);
                }
                DeliveryMode::Async(queue) => {
                    let listener = Arc::clone(&registration.listener);
                    let event = Arc::clone(&event);
                    let job = Box::new(move || deliver(listener.as_ref(), &event));
                    if let Err(err) = queue.try_submit(job) {
                        self.on_rejected(&err, registration.listener.as_ref());
                    }
                }
            }
        }
    }

    fn on_rejected(&self, err: &DispatchError, listener: &dyn Listener<E>) {
        self.rejected.fetch_add(1, Ordering::Relaxed);

        if self
            .rejection_warned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!(
                source = %self.source,
                event = std::any::type_name::<E>(),
                listener = listener.name(),
                error = %err,
                "task queue rejected event delivery; expected while a run is tearing down, \
                 suspicious mid-run. Further rejections from this source are suppressed"
            );
        } else {
            trace!(
                source = %self.source,
                listener = listener.name(),
                error = %err,
                "event delivery rejected"
            );
        }
    }
}

fn deliver<E>(listener: &dyn Listener<E>, event: &E) {
    let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
    if let Err(payload) = outcome {
        let err = DispatchError::ListenerPanicked {
            listener: listener.name().to_string(),
            message: panic_message(payload.as_ref()),
        };
        error!(
            event = std::any::type_name::<E>(),
            "uncaught failure during event delivery: {err}"
        );
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener_fn;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct Recorder {
        seen: Mutex<Vec<u32>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Listener<u32> for Recorder {
        fn on_event(&self, event: &u32) {
            self.seen.lock().push(*event);
        }
    }

    #[test]
    fn sync_delivery_before_publish_returns() {
        let dispatcher = EventDispatcher::<u32>::new("test");
        let recorder = Recorder::new();
        dispatcher.register(recorder.clone());

        dispatcher.publish(1);
        assert_eq!(*recorder.seen.lock(), vec![1]);
        dispatcher.publish(2);
        assert_eq!(*recorder.seen.lock(), vec![1, 2]);
    }

    #[test]
    fn duplicate_registration_delivers_twice() {
        let dispatcher = EventDispatcher::<u32>::new("test");
        let recorder = Recorder::new();
        dispatcher.register(recorder.clone());
        dispatcher.register(recorder.clone());

        dispatcher.publish(7);
        assert_eq!(*recorder.seen.lock(), vec![7, 7]);
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn unregister_removes_all_duplicates_by_identity() {
        let dispatcher = EventDispatcher::<u32>::new("test");
        let a = Recorder::new();
        let b = Recorder::new();
        dispatcher.register(a.clone());
        dispatcher.register(b.clone());
        dispatcher.register(a.clone());

        assert_eq!(dispatcher.unregister(&a), 2);
        assert_eq!(dispatcher.unregister(&a), 0);
        dispatcher.publish(5);

        assert!(a.seen.lock().is_empty());
        assert_eq!(*b.seen.lock(), vec![5]);
    }

    #[test]
    fn panicking_listener_does_not_stop_fan_out() {
        let dispatcher = EventDispatcher::<u32>::new("test");
        dispatcher.register(listener_fn("bomb", |_: &u32| panic!("listener failure")));
        let recorder = Recorder::new();
        dispatcher.register(recorder.clone());

        dispatcher.publish(9);
        assert_eq!(*recorder.seen.lock(), vec![9]);
    }

    #[test]
    fn has_listeners_and_clear() {
        let dispatcher = EventDispatcher::<u32>::new("test");
        assert!(!dispatcher.has_listeners());
        dispatcher.register(Recorder::new());
        assert!(dispatcher.has_listeners());
        dispatcher.clear();
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let dispatcher = EventDispatcher::<u32>::new("test");
        let first: Arc<dyn Listener<u32>> = listener_fn("first", |_: &u32| {});
        let second: Arc<dyn Listener<u32>> = listener_fn("second", |_: &u32| {});
        dispatcher.register(Arc::clone(&first));
        dispatcher.register(Arc::clone(&second));

        let names: Vec<String> = dispatcher
            .snapshot_listeners()
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn rejected_submissions_are_counted_and_dropped() {
        let dispatcher = EventDispatcher::<u32>::new("test");
        let queue = TaskQueue::spawn("closed", 4).unwrap();
        queue.shutdown();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        dispatcher.register_with(
            listener_fn("late", move |_: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            DeliveryMode::Async(queue),
        );

        dispatcher.publish(1);
        dispatcher.publish(2);
        dispatcher.publish(3);

        assert_eq!(dispatcher.rejected_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn rejection_warns_once_per_dispatcher() {
        use tracing_subscriber::layer::SubscriberExt;

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        tracing::subscriber::with_default(subscriber, || {
            let queue = TaskQueue::spawn("closed", 4).unwrap();
            queue.shutdown();

            let first = EventDispatcher::<u32>::new("first");
            let second = EventDispatcher::<u32>::new("second");
            first.register_with(listener_fn("a", |_: &u32| {}), DeliveryMode::Async(queue.clone()));
            second.register_with(listener_fn("b", |_: &u32| {}), DeliveryMode::Async(queue));

            first.publish(1);
            first.publish(2);
            first.publish(3);
            assert_eq!(warnings.load(Ordering::SeqCst), 1);

            second.publish(1);
            second.publish(2);
            assert_eq!(warnings.load(Ordering::SeqCst), 2);

            first.publish(4);
            assert_eq!(warnings.load(Ordering::SeqCst), 2);
            assert_eq!(first.rejected_count(), 4);
            assert_eq!(second.rejected_count(), 2);
        });
    }

    #[tokio::test]
    async fn async_listener_sees_publish_order() {
        let dispatcher = EventDispatcher::<u32>::new("test");
        let queue = TaskQueue::spawn("ordered", 64).unwrap();
        let recorder = Recorder::new();
        dispatcher.register_with(recorder.clone(), DeliveryMode::Async(queue.clone()));

        for i in 0..50 {
            dispatcher.publish(i);
        }
        queue.idle().await;

        assert_eq!(*recorder.seen.lock(), (0..50).collect::<Vec<_>>());
    }
}
