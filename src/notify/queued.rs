//! Asynchronous delivery worker.
//!
//! `QueuedNotifier` hands notifications to a dedicated thread over a bounded
//! channel and never blocks the caller. A slow or failing webhook therefore
//! cannot stall ingestion or timeout sweeps. Failures are logged on the
//! worker and counted; nothing is retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use crate::error::{DeliveryError, TagwatchError, TagwatchResult};

use super::notification::{Notification, Notifier};

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
    /// Rejected at enqueue because the queue was full or closed.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Wraps a notifier with a bounded queue and a delivery thread.
#[derive(Debug)]
pub struct QueuedNotifier {
    tx: Sender<Notification>,
    counters: Arc<Counters>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedNotifier {
    /// Spawns the delivery worker.
    ///
    /// # Errors
    ///
    /// Returns `TagwatchError::Internal` if the worker thread cannot be spawned.
    pub fn new<N>(inner: N, capacity: usize) -> TagwatchResult<Self>
    where
        N: Notifier + 'static,
    {
        let (tx, rx) = bounded::<Notification>(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let thread_counters = Arc::clone(&counters);
        let join = thread::Builder::new()
            .name("tagwatch-delivery".to_string())
            .spawn(move || delivery_loop(&inner, &thread_counters, &rx))
            .map_err(|e| TagwatchError::internal(format!("failed to spawn delivery worker: {e}")))?;

        Ok(Self {
            tx,
            counters,
            join: Mutex::new(Some(join)),
        })
    }

    #[must_use]
    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }

    /// Closes the queue, waits for queued notifications to be attempted, and
    /// returns the final counters.
    #[must_use]
    pub fn shutdown(mut self) -> DeliveryStats {
        self.close();
        let handle = self.join.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("delivery worker panicked");
            }
        }
        self.counters.snapshot()
    }

    fn close(&mut self) {
        let (dummy_tx, _) = bounded::<Notification>(1);
        drop(std::mem::replace(&mut self.tx, dummy_tx));
    }
}

impl Notifier for QueuedNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        match self.tx.try_send(notification.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DeliveryError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DeliveryError::Disconnected)
            }
        }
    }
}

impl Drop for QueuedNotifier {
    fn drop(&mut self) {
        // Close the queue and detach. Use `shutdown` to drain.
        self.close();
        if let Ok(mut guard) = self.join.lock() {
            drop(guard.take());
        }
    }
}

fn delivery_loop<N: Notifier>(inner: &N, counters: &Counters, rx: &Receiver<Notification>) {
    for notification in rx {
        match inner.notify(&notification) {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    kind = %notification.kind,
                    tag_id = %notification.tag_id,
                    "notification delivered"
                );
            }
            Err(error) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    kind = %notification.kind,
                    tag_id = %notification.tag_id,
                    tag_name = %notification.tag_name,
                    detector = notification.detector.as_deref().unwrap_or(""),
                    at = %notification.timestamp,
                    %error,
                    "notification delivery failed"
                );
            }
        }
    }
}
