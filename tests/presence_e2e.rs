use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use tagwatch::{
    DeliveryError, DetectionEvent, EventProcessor, IngestSettings, ManualClock, Notification, NotificationKind,
    Notifier, PresenceMonitor, PresenceState, QueuedNotifier, RecordingNotifier, TagRegistry,
};

const SNAPSHOT: &str = r#"{
    "A1B2": {"name": "front-door"},
    "C3D4": {"name": "keys"}
}"#;

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + Duration::seconds(secs)
}

fn setup() -> (EventProcessor, Arc<RecordingNotifier>) {
    let registry = TagRegistry::from_json_str(SNAPSHOT).unwrap().into_shared();
    let rec = Arc::new(RecordingNotifier::new());
    let notifier: Arc<dyn Notifier> = rec.clone();
    (EventProcessor::new(registry, notifier), rec)
}

#[test]
fn front_door_scenario_through_ingest_loop() {
    let (processor, rec) = setup();
    let clock = ManualClock::new(t(0));
    let monitor = PresenceMonitor::start(
        processor,
        IngestSettings {
            timeout: Duration::seconds(30),
            sweep_interval: StdDuration::from_millis(20),
            sweep_on_message: false,
            queue_capacity: 64,
        },
        Arc::new(clock.clone()),
    )
    .unwrap();
    let h = monitor.handle();
    let hall = br#"{"monitor_name": "hall", "tag_detected": ["A1B2"]}"#;

    // t=0: arrival.
    h.submit(&hall[..]);
    h.flush().unwrap();
    let attempts = rec.for_tag("A1B2");
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].kind, NotificationKind::Arrived);
    assert_eq!(attempts[0].tag_name, "front-door");
    assert_eq!(attempts[0].detector.as_deref(), Some("hall"));

    // t=10: refresh only.
    clock.set(t(10));
    h.submit(&hall[..]);
    h.flush().unwrap();
    assert_eq!(rec.for_tag("A1B2").len(), 1);

    // t=45: no detector reports, the timer alone detects the departure.
    clock.set(t(45));
    let deadline = std::time::Instant::now() + StdDuration::from_secs(5);
    while rec.for_tag("A1B2").len() < 2 && std::time::Instant::now() < deadline {
        std::thread::sleep(StdDuration::from_millis(10));
    }
    let attempts = rec.for_tag("A1B2");
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].kind, NotificationKind::Left);
    assert_eq!(attempts[1].tag_name, "front-door");
    assert_eq!(attempts[1].timestamp, t(45));

    // t=46: arrives again.
    clock.set(t(46));
    h.submit(&hall[..]);
    h.flush().unwrap();
    let kinds: Vec<_> = rec.for_tag("A1B2").into_iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::Arrived, NotificationKind::Left, NotificationKind::Arrived]
    );

    let presence = monitor.presence().unwrap();
    assert_eq!(presence[0].state, PresenceState::Present { last_seen: t(46) });
    assert_eq!(presence[1].state, PresenceState::Absent);

    let stats = monitor.shutdown();
    assert_eq!(stats.messages_received, 3);
    assert_eq!(stats.notifications, 3);
    assert!(stats.sweeps >= 1);
}

#[test]
fn missing_tag_detected_is_dropped_and_loop_continues() {
    let (processor, rec) = setup();
    let monitor = PresenceMonitor::start(
        processor,
        IngestSettings {
            timeout: Duration::seconds(30),
            sweep_interval: StdDuration::from_secs(3600),
            sweep_on_message: false,
            queue_capacity: 8,
        },
        Arc::new(ManualClock::new(t(0))),
    )
    .unwrap();
    let h = monitor.handle();

    h.submit(&br#"{"monitor_name": "hall"}"#[..]);
    h.flush().unwrap();
    assert!(rec.attempts().is_empty());
    assert!(monitor.presence().unwrap().iter().all(|p| p.state == PresenceState::Absent));

    h.submit(&br#"{"monitor_name": "porch", "tag_detected": ["C3D4"]}"#[..]);
    h.flush().unwrap();
    assert_eq!(rec.for_tag("C3D4").len(), 1);

    let stats = monitor.shutdown();
    assert_eq!(stats.payload_errors, 1);
    assert_eq!(stats.messages_received, 2);
}

#[test]
fn unknown_tags_never_enter_registry() {
    let (processor, rec) = setup();
    processor
        .on_detection_event(&DetectionEvent::new("hall", ["ZZZZ", "A1B2", "YYYY"], t(0)))
        .unwrap();

    let registry = processor.registry().lock().unwrap();
    assert_eq!(registry.len(), 2);
    assert!(registry.get("ZZZZ").is_none());
    assert!(rec.attempts().iter().all(|n| n.tag_id == "A1B2"));
}

#[test]
fn delivery_failure_does_not_roll_back_through_queue() {
    let registry = TagRegistry::from_json_str(SNAPSHOT).unwrap().into_shared();
    let rec = Arc::new(RecordingNotifier::new());
    rec.fail_next(1);
    let queued = Arc::new(QueuedNotifier::new(Arc::clone(&rec), 16).unwrap());
    let notifier: Arc<dyn Notifier> = queued.clone();
    let processor = EventProcessor::new(registry, notifier);

    processor
        .on_detection_event(&DetectionEvent::new("hall", ["A1B2"], t(0)))
        .unwrap();
    processor
        .on_detection_event(&DetectionEvent::new("hall", ["A1B2"], t(1)))
        .unwrap();

    {
        let registry = processor.registry().lock().unwrap();
        assert_eq!(
            registry.get("A1B2").unwrap().state(),
            PresenceState::Present { last_seen: t(1) }
        );
    }

    drop(processor);
    let queued = Arc::try_unwrap(queued).unwrap();
    let stats = queued.shutdown();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.delivered, 0);
    assert_eq!(rec.attempts().len(), 1);
}

/// Records every delivery after a short delay, so work piles up in the queue.
#[derive(Debug)]
struct SlowNotifier(Arc<RecordingNotifier>);

impl Notifier for SlowNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        std::thread::sleep(StdDuration::from_millis(5));
        self.0.notify(notification)
    }
}

#[test]
fn shutdown_drains_queued_deliveries() {
    let registry = TagRegistry::from_json_str(SNAPSHOT).unwrap().into_shared();
    let rec = Arc::new(RecordingNotifier::new());
    let queued = Arc::new(QueuedNotifier::new(SlowNotifier(Arc::clone(&rec)), 64).unwrap());
    let notifier: Arc<dyn Notifier> = queued.clone();
    let clock = ManualClock::new(t(0));
    let monitor = PresenceMonitor::start(
        EventProcessor::new(registry, notifier),
        IngestSettings {
            timeout: Duration::seconds(30),
            sweep_interval: StdDuration::from_secs(3600),
            sweep_on_message: false,
            queue_capacity: 8,
        },
        Arc::new(clock.clone()),
    )
    .unwrap();
    let h = monitor.handle();
    let both = br#"{"monitor_name": "hall", "tag_detected": ["A1B2", "C3D4"]}"#;

    // Ten arrive/leave cycles for two tags: 40 notifications.
    for cycle in 0..10 {
        clock.set(t(cycle * 100));
        h.send(&both[..]).unwrap();
        h.flush().unwrap();
        clock.set(t(cycle * 100 + 50));
        h.request_sweep();
        h.flush().unwrap();
    }

    let ingest_stats = monitor.shutdown();
    assert_eq!(ingest_stats.notifications, 40);

    let queued = Arc::try_unwrap(queued).expect("worker released the notifier");
    let delivery = queued.shutdown();
    assert_eq!(delivery.delivered, 40);
    assert_eq!(delivery.dropped, 0);
    assert_eq!(rec.attempts().len(), 40);
}

#[test]
fn restart_resets_presence() {
    let (processor, _rec) = setup();
    processor
        .on_detection_event(&DetectionEvent::new("hall", ["A1B2"], t(0)))
        .unwrap();
    drop(processor);

    // Presence is never persisted: a fresh load starts ABSENT.
    let (processor, rec) = setup();
    assert_eq!(processor.registry().lock().unwrap().present_count(), 0);
    processor
        .on_detection_event(&DetectionEvent::new("hall", ["A1B2"], t(1)))
        .unwrap();
    assert_eq!(rec.attempts()[0].kind, NotificationKind::Arrived);
}
