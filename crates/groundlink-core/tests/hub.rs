use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use groundlink_core::frame::TelemetryEvent;
use groundlink_core::hub::{BackpressurePolicy, BroadcastHub, TryRecvError};

fn event(n: usize) -> TelemetryEvent {
    TelemetryEvent::Raw { raw: n.to_string() }
}

fn index(event: &TelemetryEvent) -> usize {
    match event {
        TelemetryEvent::Raw { raw } => raw.parse().unwrap(),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_every_subscriber_sees_every_event_in_order() {
    const N: usize = 500;
    const K: usize = 8;

    let hub = BroadcastHub::new(N, BackpressurePolicy::Disconnect);
    let mut tasks = Vec::new();
    for _ in 0..K {
        let mut sub = hub.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut seen = Vec::with_capacity(N);
            while seen.len() < N {
                let event = sub.recv().await.expect("hub closed early");
                seen.push(index(&event));
            }
            seen
        }));
    }

    let publisher = hub.clone();
    std::thread::spawn(move || {
        for i in 0..N {
            assert_eq!(publisher.publish(event(i)), K);
        }
    })
    .join()
    .unwrap();

    let expected: Vec<usize> = (0..N).collect();
    for task in tasks {
        let seen = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("subscriber timed out")
            .unwrap();
        assert_eq!(seen, expected);
    }
    assert_eq!(hub.stats().published, N as u64);
}

#[tokio::test]
async fn test_recv_wakes_on_publish() {
    let hub = BroadcastHub::default();
    let mut sub = hub.subscribe();

    let waiter = tokio::spawn(async move { sub.recv().await.map(|e| index(&e)) });
    tokio::task::yield_now().await;
    hub.publish(event(7));

    let got = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, Some(7));
}

#[test]
fn test_stalled_subscriber_is_disconnected() {
    let hub = BroadcastHub::new(4, BackpressurePolicy::Disconnect);
    let mut active = hub.subscribe();
    let mut stalled = hub.subscribe();

    for i in 0..100 {
        hub.publish(event(i));
        assert_eq!(index(&active.try_recv().unwrap()), i);
    }

    assert!(stalled.is_closed());
    assert_eq!(hub.subscriber_count(), 1);
    assert_eq!(hub.stats().evicted, 1);

    // What was buffered before eviction is still delivered, then closed
    let drained: Vec<usize> = std::iter::from_fn(|| stalled.try_recv().ok())
        .map(|e| index(&e))
        .collect();
    assert_eq!(drained, vec![0, 1, 2, 3]);
    assert_eq!(stalled.try_recv().unwrap_err(), TryRecvError::Disconnected);
}

#[tokio::test]
async fn test_evicted_subscriber_recv_ends() {
    let hub = BroadcastHub::new(1, BackpressurePolicy::Disconnect);
    let mut sub = hub.subscribe();
    hub.publish(event(0));
    hub.publish(event(1));

    assert_eq!(sub.recv().await.map(|e| index(&e)), Some(0));
    assert!(sub.recv().await.is_none());
}

#[test]
fn test_stalled_subscriber_drops_oldest() {
    let hub = BroadcastHub::new(4, BackpressurePolicy::DropOldest);
    let mut active = hub.subscribe();
    let mut stalled = hub.subscribe();

    for i in 0..10 {
        assert_eq!(hub.publish(event(i)), 2);
        assert_eq!(index(&active.try_recv().unwrap()), i);
    }

    assert!(!stalled.is_closed());
    assert_eq!(hub.subscriber_count(), 2);

    let kept: Vec<usize> = std::iter::from_fn(|| stalled.try_recv().ok())
        .map(|e| index(&e))
        .collect();
    assert_eq!(kept, vec![6, 7, 8, 9]);
    assert_eq!(stalled.dropped(), 6);
    assert_eq!(active.dropped(), 0);
    assert_eq!(stalled.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn test_lagging_subscriber_recv_skips_ahead() {
    let hub = BroadcastHub::new(2, BackpressurePolicy::DropOldest);
    let mut sub = hub.subscribe();
    for i in 0..5 {
        hub.publish(event(i));
    }

    assert_eq!(sub.recv().await.map(|e| index(&e)), Some(3));
    assert_eq!(sub.recv().await.map(|e| index(&e)), Some(4));
    assert_eq!(sub.dropped(), 3);
}

#[tokio::test]
async fn test_dropping_hub_drains_buffered_events() {
    for policy in [BackpressurePolicy::DropOldest, BackpressurePolicy::Disconnect] {
        let hub = BroadcastHub::new(8, policy);
        let mut sub = hub.subscribe();
        for i in 0..3 {
            hub.publish(event(i));
        }
        drop(hub);

        let mut seen = Vec::new();
        while let Some(e) = sub.recv().await {
            seen.push(index(&e));
        }
        assert_eq!(seen, vec![0, 1, 2], "{:?}", policy);
        assert!(sub.is_closed());
    }
}

#[test]
fn test_late_subscriber_has_no_backfill() {
    let hub = BroadcastHub::default();
    hub.publish(event(0));
    hub.publish(event(1));

    let mut late = hub.subscribe();
    assert_eq!(late.try_recv().unwrap_err(), TryRecvError::Empty);

    hub.publish(event(2));
    assert_eq!(index(&late.try_recv().unwrap()), 2);
}

#[test]
fn test_events_are_shared_not_copied() {
    let hub = BroadcastHub::default();
    let mut a = hub.subscribe();
    let mut b = hub.subscribe();
    hub.publish(event(1));

    let ea = a.try_recv().unwrap();
    let eb = b.try_recv().unwrap();
    assert!(Arc::ptr_eq(&ea, &eb));
}

#[test]
fn test_churn_during_publish() {
    const N: usize = 5_000;

    let hub = BroadcastHub::new(N, BackpressurePolicy::Disconnect);
    let mut steady = hub.subscribe();
    let stop = Arc::new(AtomicBool::new(false));

    let churners: Vec<_> = (0..4)
        .map(|_| {
            let hub = hub.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let sub = hub.subscribe();
                    std::thread::yield_now();
                    drop(sub);
                }
            })
        })
        .collect();

    for i in 0..N {
        hub.publish(event(i));
    }
    stop.store(true, Ordering::Relaxed);
    for churner in churners {
        churner.join().unwrap();
    }

    let seen: Vec<usize> = std::iter::from_fn(|| steady.try_recv().ok())
        .map(|e| index(&e))
        .collect();
    assert_eq!(seen, (0..N).collect::<Vec<_>>());
    assert_eq!(hub.subscriber_count(), 1);
}
