//! Ingest loop.
//!
//! A single worker thread drives the processor from two independent stimuli:
//! inbound payloads submitted through an `IngestHandle`, and a sweep timer.
//! Because the timer does not depend on message arrival, a tag is declared
//! gone within one sweep interval of its timeout even when every detector
//! has gone quiet.
//!
//! `IngestHandle::submit` never blocks: a full queue drops the payload and
//! counts it. `IngestHandle::send` waits for room instead, for producers that
//! pull their input and can afford backpressure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{TagwatchError, TagwatchResult};
use crate::processor::EventProcessor;
use crate::registry::{lock_registry, TagPresence};

/// Parameters of the ingest worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub timeout: chrono::Duration,
    pub sweep_interval: Duration,
    /// Additionally sweep right after every handled payload.
    pub sweep_on_message: bool,
    pub queue_capacity: usize,
}

impl IngestSettings {
    #[must_use]
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: cfg.monitor.timeout(),
            sweep_interval: cfg.monitor.sweep_interval(),
            sweep_on_message: cfg.monitor.sweep_on_message,
            queue_capacity: cfg.ingest.queue_capacity,
        }
    }
}

/// Ingest counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub messages_received: u64,
    pub payload_errors: u64,
    /// Rejected at submit because the queue was full or closed.
    pub dropped_messages: u64,
    pub sweeps: u64,
    pub notifications: u64,
}

#[derive(Debug, Default)]
struct Counters {
    messages_received: AtomicU64,
    payload_errors: AtomicU64,
    dropped_messages: AtomicU64,
    sweeps: AtomicU64,
    notifications: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> IngestStats {
        IngestStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            payload_errors: self.payload_errors.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
enum IngestMsg {
    Payload(Vec<u8>),
    Sweep,
    Flush(Sender<()>),
    Shutdown,
}

/// Cloneable submission handle for the transport side.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: Sender<IngestMsg>,
    counters: Arc<Counters>,
}

impl IngestHandle {
    /// Queues a raw payload. Returns `false` if it was dropped.
    pub fn submit(&self, payload: impl Into<Vec<u8>>) -> bool {
        self.enqueue(IngestMsg::Payload(payload.into()))
    }

    /// Queues a raw payload, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `TagwatchError::Internal` if the worker has stopped.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> TagwatchResult<()> {
        self.tx.send(IngestMsg::Payload(payload.into())).map_err(|_| {
            self.counters.dropped_messages.fetch_add(1, Ordering::Relaxed);
            TagwatchError::internal("ingest worker disconnected")
        })
    }

    /// Requests an immediate timeout sweep in addition to the timer.
    pub fn request_sweep(&self) -> bool {
        self.enqueue(IngestMsg::Sweep)
    }

    /// Blocks until everything queued before this call has been handled.
    ///
    /// # Errors
    ///
    /// Returns `TagwatchError::Internal` if the worker has stopped.
    pub fn flush(&self) -> TagwatchResult<()> {
        let (done_tx, done_rx) = bounded::<()>(1);
        self.tx
            .send(IngestMsg::Flush(done_tx))
            .map_err(|_| TagwatchError::internal("ingest worker disconnected"))?;
        done_rx
            .recv()
            .map_err(|_| TagwatchError::internal("ingest worker disconnected"))
    }

    #[must_use]
    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    fn enqueue(&self, msg: IngestMsg) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped_messages.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Running presence monitor: the ingest worker plus the processor it drives.
#[derive(Debug)]
pub struct PresenceMonitor {
    handle: IngestHandle,
    processor: EventProcessor,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceMonitor {
    /// Spawns the ingest worker.
    ///
    /// # Errors
    ///
    /// Returns `TagwatchError::Internal` if the worker thread cannot be spawned.
    pub fn start(
        processor: EventProcessor,
        settings: IngestSettings,
        clock: Arc<dyn Clock>,
    ) -> TagwatchResult<Self> {
        let (tx, rx) = bounded::<IngestMsg>(settings.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            processor: processor.clone(),
            settings,
            clock,
            counters: Arc::clone(&counters),
        };
        let join = thread::Builder::new()
            .name("tagwatch-ingest".to_string())
            .spawn(move || worker.run(&rx))
            .map_err(|e| TagwatchError::internal(format!("failed to spawn ingest worker: {e}")))?;

        Ok(Self {
            handle: IngestHandle { tx, counters },
            processor,
            join: Mutex::new(Some(join)),
        })
    }

    /// A new submission handle.
    #[must_use]
    pub fn handle(&self) -> IngestHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn stats(&self) -> IngestStats {
        self.handle.stats()
    }

    /// Current presence of every known tag, ordered by tag id.
    ///
    /// # Errors
    ///
    /// Returns `TagwatchError::Internal` if the registry lock is poisoned.
    pub fn presence(&self) -> TagwatchResult<Vec<TagPresence>> {
        Ok(lock_registry(self.processor.registry())?.presence())
    }

    /// Stops the worker after it has handled everything already queued.
    #[must_use]
    pub fn shutdown(self) -> IngestStats {
        let _ = self.handle.tx.send(IngestMsg::Shutdown);
        let handle = self.join.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("ingest worker panicked");
            }
        }
        self.handle.stats()
    }
}

impl Drop for PresenceMonitor {
    fn drop(&mut self) {
        // Ask the worker to stop but do not wait; callers may still hold
        // handles, and nothing in flight needs draining.
        let _ = self.handle.tx.try_send(IngestMsg::Shutdown);
        if let Ok(mut guard) = self.join.lock() {
            drop(guard.take());
        }
    }
}

struct Worker {
    processor: EventProcessor,
    settings: IngestSettings,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
}

impl Worker {
    fn run(&self, rx: &Receiver<IngestMsg>) {
        let ticker = tick(self.settings.sweep_interval);
        info!(
            timeout_secs = self.settings.timeout.num_seconds(),
            sweep_interval_ms = u64::try_from(self.settings.sweep_interval.as_millis()).unwrap_or(u64::MAX),
            sweep_on_message = self.settings.sweep_on_message,
            "ingest worker started"
        );

        loop {
            select! {
                recv(rx) -> msg => match msg {
                    Ok(IngestMsg::Payload(payload)) => {
                        self.handle_payload(&payload);
                        if self.settings.sweep_on_message {
                            self.sweep();
                        }
                    }
                    Ok(IngestMsg::Sweep) => self.sweep(),
                    Ok(IngestMsg::Flush(done)) => {
                        let _ = done.send(());
                    }
                    Ok(IngestMsg::Shutdown) | Err(_) => break,
                },
                recv(ticker) -> _ => self.sweep(),
            }
        }

        info!("ingest worker stopped");
    }

    fn handle_payload(&self, payload: &[u8]) {
        let now = self.clock.now();
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);

        match self.processor.handle_payload(payload, now) {
            Ok(issued) => {
                self.counters.notifications.fetch_add(issued.len() as u64, Ordering::Relaxed);
            }
            Err(TagwatchError::Payload(err)) => {
                self.counters.payload_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %err,
                    at = %now,
                    payload = %String::from_utf8_lossy(payload),
                    "dropping malformed payload"
                );
            }
            Err(err) => {
                error!(error = %err, at = %now, "failed to apply detection event");
            }
        }
    }

    fn sweep(&self) {
        let now = self.clock.now();
        self.counters.sweeps.fetch_add(1, Ordering::Relaxed);

        match self.processor.on_timeout_sweep(now, self.settings.timeout) {
            Ok(issued) => {
                self.counters.notifications.fetch_add(issued.len() as u64, Ordering::Relaxed);
            }
            Err(err) => {
                error!(error = %err, at = %now, "timeout sweep failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::{Notifier, RecordingNotifier};
    use crate::registry::TagRegistry;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn settings(sweep_on_message: bool) -> IngestSettings {
        IngestSettings {
            timeout: chrono::Duration::seconds(30),
            sweep_interval: Duration::from_secs(3600),
            sweep_on_message,
            queue_capacity: 64,
        }
    }

    fn start(sweep_on_message: bool) -> (PresenceMonitor, Arc<RecordingNotifier>, ManualClock) {
        let registry = TagRegistry::load(&json!({"A1B2": {"name": "front-door"}}))
            .unwrap()
            .into_shared();
        let rec = Arc::new(RecordingNotifier::new());
        let notifier: Arc<dyn Notifier> = rec.clone();
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
        let monitor = PresenceMonitor::start(
            EventProcessor::new(registry, notifier),
            settings(sweep_on_message),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (monitor, rec, clock)
    }

    const HALL: &[u8] = br#"{"monitor_name": "hall", "tag_detected": ["A1B2"]}"#;

    #[test]
    fn malformed_payload_does_not_stop_worker() {
        let (monitor, rec, _clock) = start(false);
        let h = monitor.handle();

        assert!(h.submit(&br#"{"monitor_name": "hall"}"#[..]));
        assert!(h.submit(HALL));
        h.flush().unwrap();

        let stats = monitor.stats();
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.payload_errors, 1);
        assert_eq!(rec.attempts().len(), 1);

        let stats = monitor.shutdown();
        assert_eq!(stats.notifications, 1);
    }

    #[test]
    fn requested_sweep_uses_clock() {
        let (monitor, rec, clock) = start(false);
        let h = monitor.handle();

        h.submit(HALL);
        clock.advance(chrono::Duration::seconds(30));
        h.request_sweep();
        h.flush().unwrap();

        assert_eq!(rec.attempts().len(), 2);
        assert!(!monitor.presence().unwrap()[0].state.is_present());
        let _ = monitor.shutdown();
    }

    #[test]
    fn legacy_mode_sweeps_after_each_message() {
        let (monitor, rec, clock) = start(true);
        let h = monitor.handle();

        h.submit(HALL);
        clock.advance(chrono::Duration::seconds(31));
        // A payload naming no known tag still triggers the sweep.
        h.submit(&br#"{"monitor_name": "hall", "tag_detected": []}"#[..]);
        h.flush().unwrap();

        assert_eq!(rec.attempts().len(), 2);
        assert!(monitor.stats().sweeps >= 2);
        let _ = monitor.shutdown();
    }

    #[test]
    fn blocking_send_never_drops_under_burst() {
        let registry = TagRegistry::load(&json!({"A1B2": {"name": "front-door"}}))
            .unwrap()
            .into_shared();
        let rec = Arc::new(RecordingNotifier::new());
        let notifier: Arc<dyn Notifier> = rec.clone();
        let monitor = PresenceMonitor::start(
            EventProcessor::new(registry, notifier),
            IngestSettings {
                queue_capacity: 4,
                ..settings(false)
            },
            Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH)),
        )
        .unwrap();
        let h = monitor.handle();

        for _ in 0..2_000 {
            h.send(HALL).unwrap();
        }
        h.flush().unwrap();

        let stats = monitor.shutdown();
        assert_eq!(stats.messages_received, 2_000);
        assert_eq!(stats.dropped_messages, 0);
        assert_eq!(rec.attempts().len(), 1);
    }

    #[test]
    fn submit_after_shutdown_is_dropped() {
        let (monitor, _rec, _clock) = start(false);
        let h = monitor.handle();
        let _ = monitor.shutdown();

        assert!(!h.submit(HALL));
        assert!(h.send(HALL).is_err());
        assert_eq!(h.stats().dropped_messages, 2);
        assert!(h.flush().is_err());
    }
}
