// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Fixed-interval sample capture for the active trip

use crate::pipeline::DeliveryPipeline;
use crate::position::PositionFix;
use crate::protocol::TelemetrySample;
use crate::trips::{TripLogEntry, TripManager};
use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Captures one sample per interval for the life of a trip
///
/// The timer never restarts; position and occupancy are read from shared
/// cells at each firing so the freshest values always win. A tick without
/// a usable fix produces nothing. Delivery runs on its own task per tick,
/// so a stalled transport never holds back the next capture.
pub struct SampleProducer {
    trips: Arc<TripManager>,
    pipeline: Arc<DeliveryPipeline>,
    position: watch::Receiver<Option<PositionFix>>,
    occupancy: Arc<AtomicU32>,
    device_id: String,
    trip_id: String,
    interval: Duration,
    max_fix_age: Duration,
}

impl SampleProducer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trips: Arc<TripManager>,
        pipeline: Arc<DeliveryPipeline>,
        position: watch::Receiver<Option<PositionFix>>,
        occupancy: Arc<AtomicU32>,
        device_id: String,
        trip_id: String,
        interval: Duration,
        max_fix_age: Duration,
    ) -> Self {
        Self {
            trips,
            pipeline,
            position,
            occupancy,
            device_id,
            trip_id,
            interval,
            max_fix_age,
        }
    }

    /// Run the capture loop until the task is aborted
    pub async fn run(&self) {
        // First sample lands one full interval after trip start. Ticks
        // stalled behind a slow capture are skipped, not burst, so a
        // stall never produces a run of near-identical samples.
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            // Capture stays on the timer task; the send leaves it, so the
            // next tick never waits behind a slow or black-holed transport
            match self.capture().await {
                Ok(Some(sample)) => {
                    let pipeline = self.pipeline.clone();
                    let trip_id = self.trip_id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = pipeline.deliver(sample).await {
                            warn!("Sample delivery failed for trip '{}': {}", trip_id, e);
                        }
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Sample capture failed for trip '{}': {}", self.trip_id, e);
                }
            }
        }
    }

    /// Read the shared cells and append one trip-log entry
    ///
    /// Returns the sample still owed to the collector, or `None` on a tick
    /// without a usable fix.
    pub async fn capture(&self) -> Result<Option<TelemetrySample>> {
        let fix = match self.usable_fix() {
            Some(fix) => fix,
            None => {
                debug!("No usable fix, skipping sample for trip '{}'", self.trip_id);
                return Ok(None);
            }
        };

        let occupancy = self.occupancy.load(Ordering::Relaxed);
        let now = Utc::now();

        // The trip log keeps this entry even if every delivery attempt fails
        self.trips
            .append_log(TripLogEntry {
                timestamp: now,
                latitude: fix.latitude,
                longitude: fix.longitude,
                accuracy: fix.accuracy,
                occupancy: None,
                occupancy_count: Some(occupancy),
            })
            .await?;

        Ok(Some(TelemetrySample {
            trip_id: self.trip_id.clone(),
            device_id: self.device_id.clone(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            occupancy_count: occupancy,
            timestamp: now,
        }))
    }

    /// Capture and deliver in one awaited call; returns false on a skipped tick
    pub async fn capture_once(&self) -> Result<bool> {
        match self.capture().await? {
            Some(sample) => {
                self.pipeline.deliver(sample).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Latest fix, unless it has aged past the staleness ceiling
    fn usable_fix(&self) -> Option<PositionFix> {
        let fix = (*self.position.borrow())?;
        if !fix.is_fresh(self.max_fix_age) {
            debug!("Latest fix is stale, treating as absent");
            return None;
        }
        Some(fix)
    }
}
