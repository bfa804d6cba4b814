//! Event queue back-pressure and dispatch tests

use slotwatch::notifications::{
    EmitOutcome, EventDispatcher, EventKind, EventPriority, EventQueue, LogChannel, MonitorEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn low(n: usize) -> MonitorEvent {
    MonitorEvent::status(format!("status {n}")).with_priority(EventPriority::Low)
}

/// A full queue still accepts a critical event by evicting the oldest
#[test]
fn test_critical_event_survives_full_queue() {
    let queue = EventQueue::new(1000);
    for n in 0..1000 {
        assert_eq!(queue.emit(low(n)), EmitOutcome::Queued);
    }
    assert_eq!(queue.len(), 1000);

    let critical = MonitorEvent::error("store unavailable", EventPriority::Critical);
    let id = critical.id.clone();
    assert_eq!(queue.emit(critical), EmitOutcome::Evicted);

    let events = queue.snapshot();
    assert_eq!(events.len(), 1000);
    assert!(events.iter().any(|e| e.id == id));
    assert_eq!(events[0].message, "status 1", "oldest event is the one evicted");

    let stats = queue.stats();
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.sent, 1001);
}

/// A full queue drops normal and low priority events
#[test]
fn test_low_priority_dropped_when_full() {
    let queue = EventQueue::new(2);
    queue.emit(low(0));
    queue.emit(low(1));

    assert_eq!(queue.emit(low(2)), EmitOutcome::Dropped);
    assert_eq!(
        queue.emit(MonitorEvent::new(EventKind::SlotFound, "slot")),
        EmitOutcome::Dropped
    );
    assert_eq!(
        queue.emit(MonitorEvent::new(EventKind::RegistrationSuccess, "booked")),
        EmitOutcome::Evicted
    );

    let stats = queue.stats();
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.depth, 2);
}

/// Pull waits for an event emitted from another task
#[tokio::test]
async fn test_pull_wakes_on_emit() {
    let queue = Arc::new(EventQueue::new(10));
    let producer = Arc::clone(&queue);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.emit(MonitorEvent::new(EventKind::MonitorStarted, "started"));
    });

    let event = queue.pull(Duration::from_secs(2)).await.expect("event");
    assert_eq!(event.kind, EventKind::MonitorStarted);
    assert!(queue.pull(Duration::from_millis(20)).await.is_none());
    assert_eq!(queue.stats().received, 1);
}

/// The dispatcher empties the queue through the log channel and stops
#[tokio::test]
async fn test_dispatcher_with_log_channel() {
    let queue = Arc::new(EventQueue::new(10));
    for n in 0..5 {
        queue.emit(low(n));
    }

    let (tx, rx) = watch::channel(false);
    let handle = EventDispatcher::new(Arc::clone(&queue), Duration::from_millis(10))
        .with_channel(Arc::new(LogChannel::new()))
        .spawn(rx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(queue.is_empty());
    assert_eq!(queue.stats().received, 5);
}
