use crate::collector::CollectorApi;
use crate::protocol::TelemetrySample;
use crate::store::{key_to_file_name, LocalStore};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Store key holding the pending queue for a trip
pub fn queue_key(trip_id: &str) -> String {
    format!("queue_{}", key_to_file_name(trip_id))
}

/// Delivery pipeline for one trip's samples
///
/// Each sample gets one immediate delivery attempt; failures land in a
/// durable per-trip queue, and every tick and every reconnect tries to
/// drain it. Delivery is at-least-once: a crash between a successful send
/// and the queue rewrite may replay samples, it never loses them.
pub struct DeliveryPipeline {
    store: Arc<LocalStore>,
    collector: Arc<dyn CollectorApi>,
    trip_id: String,
    queue_key: String,

    // Cross-task drain guard; a flush that finds it set is a no-op
    flush_in_progress: AtomicBool,

    // Serializes queue read-modify-write; never held across a network call
    queue_mutex: Mutex<()>,

    // Observable counters
    queued: AtomicUsize,
    delivered: AtomicU64,
}

impl DeliveryPipeline {
    pub async fn new(
        store: Arc<LocalStore>,
        collector: Arc<dyn CollectorApi>,
        trip_id: String,
    ) -> Self {
        let queue_key = queue_key(&trip_id);
        let existing = store
            .read::<Vec<TelemetrySample>>(&queue_key)
            .await
            .unwrap_or_default();

        if !existing.is_empty() {
            info!(
                "Trip '{}' has {} samples queued from a previous run",
                trip_id,
                existing.len()
            );
        }

        Self {
            store,
            collector,
            trip_id,
            queue_key,
            flush_in_progress: AtomicBool::new(false),
            queue_mutex: Mutex::new(()),
            queued: AtomicUsize::new(existing.len()),
            delivered: AtomicU64::new(0),
        }
    }

    /// Capture-time entry point: one direct attempt, queue on failure,
    /// then drain whatever is pending
    pub async fn deliver(&self, sample: TelemetrySample) -> Result<()> {
        if let Err(e) = self.direct_send(&sample).await {
            debug!("Direct send failed for trip '{}': {}", self.trip_id, e);
            self.enqueue(sample).await?;
        }

        // Runs even after a successful send so older samples catch up
        self.flush().await
    }

    /// Single delivery attempt with no retry
    pub async fn direct_send(&self, sample: &TelemetrySample) -> Result<()> {
        self.collector.log_sample(sample).await?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Append a sample to the durable queue
    pub async fn enqueue(&self, sample: TelemetrySample) -> Result<()> {
        let _guard = self.queue_mutex.lock().await;
        let mut queue = self.read_queue().await;
        queue.push(sample);
        self.store.write(&self.queue_key, &queue).await?;
        self.queued.store(queue.len(), Ordering::Relaxed);
        debug!(
            "Queued sample for trip '{}' ({} pending)",
            self.trip_id,
            queue.len()
        );
        Ok(())
    }

    /// Drain the queue, sending in enqueue order
    ///
    /// The in-progress flag is held for the whole drain so overlapping
    /// calls collapse into one pass; it is cleared on every exit path,
    /// including a drain cancelled mid-send. Samples that fail to send
    /// stay queued, in order, ahead of anything enqueued while the drain
    /// was running.
    pub async fn flush(&self) -> Result<()> {
        if self
            .flush_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already running for trip '{}'", self.trip_id);
            return Ok(());
        }

        // Cleared on drop; an aborted drain task must not wedge the flag
        struct DrainGuard<'a>(&'a AtomicBool);
        impl Drop for DrainGuard<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::Release);
            }
        }
        let _guard = DrainGuard(&self.flush_in_progress);

        self.drain().await
    }

    async fn drain(&self) -> Result<()> {
        // Snapshot under the queue mutex, send outside it
        let snapshot = {
            let _guard = self.queue_mutex.lock().await;
            self.read_queue().await
        };

        if snapshot.is_empty() {
            return Ok(());
        }

        debug!(
            "Draining {} queued samples for trip '{}'",
            snapshot.len(),
            self.trip_id
        );

        let mut remaining = Vec::new();
        for sample in &snapshot {
            match self.collector.log_sample(sample).await {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    debug!("Queued send failed for trip '{}': {}", self.trip_id, e);
                    remaining.push(sample.clone());
                }
            }
        }

        // Rewrite the queue: failures first, then anything that arrived
        // while the drain was sending
        let _guard = self.queue_mutex.lock().await;
        let current = self.read_queue().await;
        let mut rewritten = remaining;
        rewritten.extend(current.into_iter().skip(snapshot.len()));

        if !rewritten.is_empty() {
            warn!(
                "{} samples still pending for trip '{}'",
                rewritten.len(),
                self.trip_id
            );
        }

        self.store.write(&self.queue_key, &rewritten).await?;
        self.queued.store(rewritten.len(), Ordering::Relaxed);
        Ok(())
    }

    /// Drop the queue without sending; used at trip end after the final drain
    pub async fn clear_queue(&self) -> Result<()> {
        let _guard = self.queue_mutex.lock().await;
        self.store.remove(&self.queue_key).await?;
        self.queued.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn read_queue(&self) -> Vec<TelemetrySample> {
        self.store.read(&self.queue_key).await.unwrap_or_default()
    }

    /// Samples currently waiting for delivery
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Samples delivered since this pipeline was created
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}
