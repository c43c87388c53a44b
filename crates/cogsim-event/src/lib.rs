//! Event dispatch for cogsim.
//!
//! Publishers (model schedulers, the controller, connector participants)
//! hand events to an [`EventDispatcher`]; listeners register with it and
//! receive each event either inline or through a [`TaskQueue`].
//!
//! # Crate Architecture
//!
//! ```text
//! cogsim-types    : ids, ErrorCode
//! cogsim-event    : EventDispatcher, TaskQueue   ◄── HERE
//! cogsim-runtime  : models, scheduler, controller, connector, locks
//! cogsim-cli      : the `cogsim` binary
//! ```
//!
//! # Guarantees
//!
//! | Property | Sync | Async |
//! |----------|------|-------|
//! | Delivered before `publish` returns | Yes | No |
//! | Per-listener publish order | Yes | Yes (one worker per queue) |
//! | Listener panic reaches publisher | No | No |
//! | Dropped under backpressure | Never | When the queue refuses |
//!
//! # Example
//!
//! ```
//! use cogsim_event::{listener_fn, DeliveryMode, EventDispatcher, TaskQueue};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let dispatcher = EventDispatcher::<&'static str>::new("example");
//! let queue = TaskQueue::spawn("trace", 16).unwrap();
//!
//! let seen = Arc::new(AtomicUsize::new(0));
//! let s = Arc::clone(&seen);
//! dispatcher.register_with(
//!     listener_fn("trace", move |_: &&'static str| {
//!         s.fetch_add(1, Ordering::SeqCst);
//!     }),
//!     DeliveryMode::Async(queue.clone()),
//! );
//!
//! dispatcher.publish("cycle");
//! queue.idle().await;
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

mod dispatcher;
mod error;
mod listener;
mod queue;

pub use dispatcher::{DeliveryMode, EventDispatcher};
pub use error::DispatchError;
pub use listener::{listener_fn, FnListener, Listener};
pub use queue::{Job, TaskQueue, DEFAULT_QUEUE_CAPACITY};
