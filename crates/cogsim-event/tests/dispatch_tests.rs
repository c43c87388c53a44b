//! Integration tests for mixed sync/async delivery.

use cogsim_event::{listener_fn, DeliveryMode, EventDispatcher, Listener, TaskQueue};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Probe {
    Fired(&'static str),
    Tick(u32),
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_and_slow_async_listener_each_receive_once() {
    let dispatcher = EventDispatcher::<Probe>::new("scenario");
    let queue = TaskQueue::spawn("slow", 8).unwrap();

    let sync_hits = Arc::new(AtomicUsize::new(0));
    let async_hits = Arc::new(AtomicUsize::new(0));

    let s = Arc::clone(&sync_hits);
    dispatcher.register(listener_fn("sync", move |_: &Probe| {
        s.fetch_add(1, Ordering::SeqCst);
    }));

    let a = Arc::clone(&async_hits);
    dispatcher.register_with(
        listener_fn("slow", move |_: &Probe| {
            std::thread::sleep(Duration::from_millis(100));
            a.fetch_add(1, Ordering::SeqCst);
        }),
        DeliveryMode::Async(queue.clone()),
    );

    let started = std::time::Instant::now();
    dispatcher.publish(Probe::Fired("p1"));
    let publish_took = started.elapsed();

    // Sync delivery is done, the slow listener has not blocked the publisher.
    assert_eq!(sync_hits.load(Ordering::SeqCst), 1);
    assert!(publish_took < Duration::from_millis(100));

    queue.idle().await;
    assert_eq!(async_hits.load(Ordering::SeqCst), 1);
    assert_eq!(sync_hits.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.rejected_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registration_during_publish_does_not_disturb_it() {
    let dispatcher = Arc::new(EventDispatcher::<Probe>::new("cow"));
    let late_hits = Arc::new(AtomicUsize::new(0));

    // The first listener registers a new one while the publication is in
    // flight; the new one must not see the current event.
    let d = Arc::clone(&dispatcher);
    let hits = Arc::clone(&late_hits);
    let registered = Arc::new(AtomicUsize::new(0));
    let reg = Arc::clone(&registered);
    dispatcher.register(listener_fn("registrar", move |_: &Probe| {
        if reg.fetch_add(1, Ordering::SeqCst) == 0 {
            let hits = Arc::clone(&hits);
            d.register(listener_fn("late", move |_: &Probe| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
    }));

    dispatcher.publish(Probe::Tick(1));
    assert_eq!(late_hits.load(Ordering::SeqCst), 0);
    assert_eq!(dispatcher.len(), 2);

    dispatcher.publish(Probe::Tick(2));
    assert_eq!(late_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishers_deliver_every_event() {
    let dispatcher = Arc::new(EventDispatcher::<Probe>::new("many"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    dispatcher.register(listener_fn("collect", move |p: &Probe| {
        s.lock().push(p.clone());
    }));

    let mut handles = Vec::new();
    for worker in 0..4u32 {
        let d = Arc::clone(&dispatcher);
        handles.push(tokio::spawn(async move {
            for i in 0..25u32 {
                d.publish(Probe::Tick(worker * 100 + i));
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(seen.lock().len(), 100);
}

#[tokio::test]
async fn failing_async_listener_keeps_worker_alive() {
    let dispatcher = EventDispatcher::<Probe>::new("resilient");
    let queue = TaskQueue::spawn("resilient", 8).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    dispatcher.register_with(
        listener_fn("bomb", |p: &Probe| {
            if *p == Probe::Tick(1) {
                panic!("bad tick");
            }
        }),
        DeliveryMode::Async(queue.clone()),
    );
    let h = Arc::clone(&hits);
    dispatcher.register_with(
        listener_fn("counter", move |_: &Probe| {
            h.fetch_add(1, Ordering::SeqCst);
        }),
        DeliveryMode::Async(queue.clone()),
    );

    dispatcher.publish(Probe::Tick(1));
    dispatcher.publish(Probe::Tick(2));
    queue.idle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn unregister_stops_future_delivery() {
    let dispatcher = EventDispatcher::<Probe>::new("unregister");
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let listener: Arc<dyn Listener<Probe>> = listener_fn("once", move |_: &Probe| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    dispatcher.register(Arc::clone(&listener));
    dispatcher.publish(Probe::Tick(0));
    assert_eq!(dispatcher.unregister(&listener), 1);
    dispatcher.publish(Probe::Tick(1));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!dispatcher.has_listeners());
}
