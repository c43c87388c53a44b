//! Listener trait and closure adapter.

use std::sync::Arc;

/// Receives events of type `E` from an [`EventDispatcher`](crate::EventDispatcher).
///
/// Handlers must not assume which thread calls them: synchronous
/// registrations run on the publisher's thread, asynchronous ones on a
/// [`TaskQueue`](crate::TaskQueue) worker.
pub trait Listener<E>: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &E);

    /// Name used in logs when delivery to this listener fails.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A [`Listener`] backed by a closure.
pub struct FnListener<F> {
    name: String,
    handler: F,
}

impl<F> std::fmt::Debug for FnListener<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnListener")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<E, F> Listener<E> for FnListener<F>
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.handler)(event);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wraps a closure as a shareable listener.
///
/// Keep the returned `Arc` to [`unregister`](crate::EventDispatcher::unregister)
/// it later.
///
/// ```
/// use cogsim_event::{listener_fn, Listener};
///
/// let l = listener_fn("noop", |_: &String| {});
/// assert_eq!(l.name(), "noop");
/// ```
pub fn listener_fn<E, F>(name: impl Into<String>, handler: F) -> Arc<dyn Listener<E>>
where
    E: 'static,
    F: Fn(&E) + Send + Sync + 'static,
{
    Arc::new(FnListener {
        name: name.into(),
        handler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named;

    impl Listener<()> for Named {
        fn on_event(&self, _event: &()) {}
    }

    #[test]
    fn default_name_is_type_name() {
        assert!(Named.name().ends_with("Named"));
    }

    #[test]
    fn closure_listener_invokes_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let l = listener_fn("count", move |n: &usize| {
            counter.fetch_add(*n, Ordering::SeqCst);
        });

        l.on_event(&2);
        l.on_event(&3);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(l.name(), "count");
    }
}
