//! Timestamped percept queue shared by the model bridges.

use super::envelope::Percept;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// Percepts waiting for a model, ordered by timestamp then arrival.
///
/// Every push wakes one waiter on the notifier. `Notify` keeps a permit when
/// nobody waits, so a push that races with the scheduler going to sleep is
/// never lost.
#[derive(Debug, Default)]
pub(crate) struct PerceptInbox {
    queue: Mutex<Vec<(f64, Percept)>>,
    notify: Arc<Notify>,
}

impl PerceptInbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, timestamp: f64, percept: Percept) {
        {
            let mut queue = self.queue.lock();
            let at = queue.partition_point(|(t, _)| *t <= timestamp);
            queue.insert(at, (timestamp, percept));
        }
        self.notify.notify_one();
    }

    /// Removes and returns every percept stamped at or before `up_to`.
    pub(crate) fn take(&self, up_to: f64) -> Vec<(f64, Percept)> {
        let mut queue = self.queue.lock();
        let due = queue.partition_point(|(t, _)| *t <= up_to);
        queue.drain(..due).collect()
    }

    pub(crate) fn next_time(&self) -> Option<f64> {
        self.queue.lock().first().map(|(t, _)| *t)
    }

    pub(crate) fn wake(&self) {
        self.notify.notify_one();
    }

    pub(crate) fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chunk;

    fn percept(name: &str) -> Percept {
        Percept::new("visual", Chunk::new(name, "loc"))
    }

    #[test]
    fn ordered_by_time_then_arrival() {
        let inbox = PerceptInbox::new();
        inbox.push(2.0, percept("late"));
        inbox.push(1.0, percept("a"));
        inbox.push(1.0, percept("b"));

        assert_eq!(inbox.next_time(), Some(1.0));
        let due: Vec<_> = inbox
            .take(1.5)
            .into_iter()
            .map(|(_, p)| p.chunk.name().to_string())
            .collect();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(inbox.next_time(), Some(2.0));
    }

    #[tokio::test]
    async fn push_before_wait_is_not_lost() {
        let inbox = PerceptInbox::new();
        let notify = inbox.notifier();
        inbox.push(0.0, percept("x"));
        tokio::time::timeout(std::time::Duration::from_secs(1), notify.notified())
            .await
            .unwrap();
    }
}
