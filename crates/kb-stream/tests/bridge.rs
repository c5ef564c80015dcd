//! Event ordering, heartbeats and failure handling of the bridge.

use std::time::Duration;

use futures::StreamExt;
use kb_core::KbError;
use kb_stream::{Bridge, BridgeConfig, QueueMode, StreamEvent};

fn scaled(heartbeat_ms: u64) -> BridgeConfig {
    BridgeConfig {
        heartbeat_interval: Duration::from_millis(heartbeat_ms),
        poll_interval: Duration::from_millis(10),
        join_timeout: Duration::from_millis(500),
        queue: QueueMode::Unbounded,
    }
}

#[tokio::test]
async fn test_fast_producer_has_no_heartbeats() {
    let stream = Bridge::new(BridgeConfig::default())
        .run(|emitter| {
            for item in ["x1", "x2", "x3"] {
                emitter.progress(item);
            }
            Ok("done")
        })
        .unwrap();

    let events: Vec<_> = stream.collect().await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Progress("x1".into()),
            StreamEvent::Progress("x2".into()),
            StreamEvent::Progress("x3".into()),
            StreamEvent::Complete("done"),
        ]
    );
}

#[tokio::test]
async fn test_slow_producer_gets_heartbeats_first() {
    let stream = Bridge::new(scaled(100))
        .run(|emitter| {
            std::thread::sleep(Duration::from_millis(350));
            emitter.progress("late");
            Ok(())
        })
        .unwrap();

    let events: Vec<_> = stream.collect().await;
    let item_at = events
        .iter()
        .position(|e| *e == StreamEvent::Progress("late".into()))
        .unwrap();
    assert!(item_at >= 1);
    assert!(events[..item_at].iter().all(|e| *e == StreamEvent::Heartbeat));
    assert_eq!(events.last(), Some(&StreamEvent::Complete(())));
}

#[tokio::test]
async fn test_failing_producer_ends_with_one_error() {
    let stream = Bridge::new(scaled(1_000))
        .run(|emitter| -> kb_core::Result<()> {
            emitter.progress("x1");
            Err(KbError::internal("boom"))
        })
        .unwrap();

    let events: Vec<_> = stream.collect().await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Progress("x1".into()),
            StreamEvent::Error("Internal error: boom".into()),
        ]
    );
}

#[tokio::test]
async fn test_panicking_producer_is_contained() {
    let stream = Bridge::new(scaled(1_000))
        .run(|emitter| -> kb_core::Result<u32> {
            emitter.progress("before");
            panic!("worker exploded");
        })
        .unwrap();

    let events: Vec<_> = stream.collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], StreamEvent::Progress("before".into()));
    match &events[1] {
        StreamEvent::Error(message) => assert!(message.contains("worker exploded")),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bounded_queue_preserves_order() {
    let config = BridgeConfig {
        queue: QueueMode::Bounded(1),
        ..scaled(1_000)
    };
    let stream = Bridge::new(config)
        .run(|emitter| {
            for i in 0..50 {
                emitter.progress(format!("step {}", i));
            }
            Ok(50usize)
        })
        .unwrap();

    let events: Vec<_> = stream.collect().await;
    assert_eq!(events.len(), 51);
    for (i, event) in events[..50].iter().enumerate() {
        assert_eq!(*event, StreamEvent::Progress(format!("step {}", i)));
    }
    assert_eq!(events[50], StreamEvent::Complete(50));
}

#[tokio::test]
async fn test_heartbeats_never_reorder_items() {
    let stream = Bridge::new(scaled(30))
        .run(|emitter| {
            for i in 0..4 {
                std::thread::sleep(Duration::from_millis(70));
                emitter.progress(i.to_string());
            }
            Ok(())
        })
        .unwrap();

    let events: Vec<_> = stream.collect().await;
    let items: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Progress(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(items, vec!["0", "1", "2", "3"]);
    assert!(events.iter().any(|e| *e == StreamEvent::Heartbeat));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}
