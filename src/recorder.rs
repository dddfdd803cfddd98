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

// Trip lifecycle management

use crate::collector::CollectorApi;
use crate::config::RecorderConfig;
use crate::pipeline::{queue_key, DeliveryPipeline};
use crate::position::PositionFix;
use crate::producer::SampleProducer;
use crate::protocol::{StartTripRequest, TripSetup, TripStatus};
use crate::store::LocalStore;
use crate::trips::{NewTrip, Trip, TripCompletion, TripManager, TripPatch};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Tasks and shared cells for one running trip
struct ActiveSession {
    trip_id: String,
    pipeline: Arc<DeliveryPipeline>,
    occupancy: Arc<AtomicU32>,
    producer_task: JoinHandle<()>,
    reconnect_task: JoinHandle<()>,
}

/// Owns the trip lifecycle and the per-trip capture and delivery tasks
///
/// At most one trip runs at a time. Starting over a running trip replaces
/// it; the replaced trip loses its queue and never reaches history.
pub struct TripRecorder {
    store: Arc<LocalStore>,
    trips: Arc<TripManager>,
    collector: Arc<dyn CollectorApi>,
    device_id: String,
    sample_interval: Duration,
    max_fix_age: Duration,
    export_dir: PathBuf,
    position: watch::Receiver<Option<PositionFix>>,
    online: watch::Receiver<bool>,
    session: Mutex<Option<ActiveSession>>,
}

impl TripRecorder {
    pub fn new(
        store: Arc<LocalStore>,
        collector: Arc<dyn CollectorApi>,
        device_id: String,
        config: &RecorderConfig,
        position: watch::Receiver<Option<PositionFix>>,
        online: watch::Receiver<bool>,
    ) -> Self {
        Self {
            trips: Arc::new(TripManager::new(store.clone())),
            store,
            collector,
            device_id,
            sample_interval: Duration::from_secs(config.recorder.sample_interval_seconds),
            max_fix_age: Duration::from_secs(config.recorder.max_fix_age_seconds),
            export_dir: PathBuf::from(&config.store.export_dir),
            position,
            online,
            session: Mutex::new(None),
        }
    }

    /// Re-arm capture and delivery for a trip persisted by a previous run
    pub async fn resume_active_trip(&self) -> Result<Option<Trip>> {
        let trip = match self.trips.active_trip().await {
            Some(trip) => trip,
            None => return Ok(None),
        };

        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(Some(trip));
        }

        info!("Resuming trip '{}' from a previous run", trip.trip_id);
        *session = Some(self.spawn_session(&trip).await);
        Ok(Some(trip))
    }

    /// Validate setup, register with the collector, then start locally
    ///
    /// Collector failure leaves no local state behind.
    pub async fn start_trip(&self, setup: TripSetup) -> Result<Trip> {
        setup.validate()?;

        let request = StartTripRequest {
            route_id: setup.route.clone(),
            direction: setup.direction.clone(),
            recorder_id: self.device_id.clone(),
            jeep_code: setup.jeep_code.clone(),
            official_capacity: setup.capacity,
            starting_occupancy: setup.starting_occupancy,
        };

        let registered = self
            .collector
            .start_trip(&request)
            .await
            .context("Failed to start trip")?;

        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            warn!("Replacing running trip '{}'", previous.trip_id);
            Self::stop_session_tasks(&previous);
        }

        // The replaced trip vanishes along with its queue
        if let Some(previous) = self.trips.active_trip().await {
            self.store.remove(&queue_key(&previous.trip_id)).await?;
        }

        let trip = self
            .trips
            .start_trip(NewTrip {
                trip_id: registered.trip_id,
                route: setup.route,
                direction: setup.direction,
                jeep_code: setup.jeep_code,
                capacity: setup.capacity,
                starting_occupancy: setup.starting_occupancy,
            })
            .await?;

        *session = Some(self.spawn_session(&trip).await);
        info!(
            "Trip '{}' capturing every {:?}",
            trip.trip_id, self.sample_interval
        );
        Ok(trip)
    }

    /// Record one passenger boarding
    pub async fn board(&self) -> Result<u32> {
        self.adjust_occupancy(1).await
    }

    /// Record one passenger alighting; occupancy never goes below zero
    pub async fn alight(&self) -> Result<u32> {
        self.adjust_occupancy(-1).await
    }

    async fn adjust_occupancy(&self, delta: i32) -> Result<u32> {
        let session = self.session.lock().await;
        let session = match session.as_ref() {
            Some(session) => session,
            None => bail!("No trip in progress"),
        };

        let previous = session.occupancy.load(Ordering::Relaxed);
        let updated = if delta >= 0 {
            previous.saturating_add(delta as u32)
        } else {
            previous.saturating_sub(delta.unsigned_abs())
        };
        session.occupancy.store(updated, Ordering::Relaxed);

        self.trips
            .update_active_trip(TripPatch {
                live_occupancy: Some(updated),
            })
            .await?;

        Ok(updated)
    }

    /// Finish the active trip
    ///
    /// Capture stops, the queue gets one final drain and is then dropped
    /// whatever the outcome, and the completed trip lands in history. The
    /// collector hearing about the end is best effort; local completion
    /// is authoritative.
    pub async fn end_trip(&self) -> Result<Option<Trip>> {
        let mut session = self.session.lock().await;
        let active = match session.take() {
            Some(active) => active,
            None => return Ok(None),
        };
        drop(session);

        Self::stop_session_tasks(&active);

        if let Err(e) = active.pipeline.flush().await {
            warn!("Final drain failed for trip '{}': {}", active.trip_id, e);
        }
        let undelivered = active.pipeline.queued();
        if undelivered > 0 {
            warn!(
                "Dropping {} undelivered samples for trip '{}'",
                undelivered, active.trip_id
            );
        }
        active.pipeline.clear_queue().await?;

        if let Err(e) = self.collector.end_trip(&active.trip_id).await {
            warn!(
                "Collector did not acknowledge end of trip '{}': {}",
                active.trip_id, e
            );
        }

        // Completion names this session's trip; if a concurrent start
        // already replaced the slot, the new trip is left alone
        self.trips
            .end_trip(
                &active.trip_id,
                TripCompletion {
                    final_occupancy: active.occupancy.load(Ordering::Relaxed),
                    logs_sent: active.pipeline.delivered(),
                    queue_remaining: 0,
                },
            )
            .await
    }

    /// Live status snapshot
    pub async fn status(&self) -> TripStatus {
        let online = *self.online.borrow();
        let fix = (*self.position.borrow()).filter(|f| f.is_fresh(self.max_fix_age));

        let session = self.session.lock().await;
        match session.as_ref() {
            Some(active) => {
                let trip = self.trips.active_trip().await;
                TripStatus {
                    active: true,
                    trip_id: Some(active.trip_id.clone()),
                    route: trip.as_ref().map(|t| t.route.clone()),
                    device_id: self.device_id.clone(),
                    occupancy: active.occupancy.load(Ordering::Relaxed),
                    capacity: trip.as_ref().map(|t| t.capacity).unwrap_or(0),
                    over_capacity: trip.as_ref().map(|t| t.is_over_capacity()).unwrap_or(false),
                    online,
                    has_fix: fix.is_some(),
                    fix_accuracy: fix.map(|f| f.accuracy),
                    queued: active.pipeline.queued(),
                    logs_sent: active.pipeline.delivered(),
                    log_count: trip.map(|t| t.logs.len()).unwrap_or(0),
                }
            }
            None => TripStatus {
                active: false,
                trip_id: None,
                route: None,
                device_id: self.device_id.clone(),
                occupancy: 0,
                capacity: 0,
                over_capacity: false,
                online,
                has_fix: fix.is_some(),
                fix_accuracy: fix.map(|f| f.accuracy),
                queued: 0,
                logs_sent: 0,
                log_count: 0,
            },
        }
    }

    /// Completed trips, oldest first
    pub async fn list_trips(&self) -> Vec<Trip> {
        self.trips.all_trips().await
    }

    /// Remove a completed trip from history; unknown ids are a no-op
    pub async fn delete_trip(&self, trip_id: &str) -> Result<()> {
        self.trips.delete_trip(trip_id).await
    }

    /// Render a completed trip's log as CSV and drop a copy in the export dir
    pub async fn export_trip(&self, trip_id: &str) -> Result<String> {
        let trip = match self.trips.find_trip(trip_id).await {
            Some(trip) => trip,
            None => bail!("Unknown trip '{}'", trip_id),
        };

        let csv = crate::export::trip_to_csv(&trip)?;
        let path = crate::export::write_trip_csv(&self.export_dir, &trip, &csv).await?;
        info!("Exported trip '{}' to {}", trip_id, path.display());
        Ok(csv)
    }

    /// Stop background work, leaving all persisted state in place
    ///
    /// An active trip stays in the store and resumes on the next run.
    pub async fn shutdown(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Some(active) = session.take() {
            info!(
                "Shutting down with trip '{}' active; it will resume on restart",
                active.trip_id
            );
            Self::stop_session_tasks(&active);
        }
        Ok(())
    }

    fn stop_session_tasks(session: &ActiveSession) {
        session.producer_task.abort();
        session.reconnect_task.abort();
    }

    async fn spawn_session(&self, trip: &Trip) -> ActiveSession {
        let pipeline = Arc::new(
            DeliveryPipeline::new(
                self.store.clone(),
                self.collector.clone(),
                trip.trip_id.clone(),
            )
            .await,
        );
        let occupancy = Arc::new(AtomicU32::new(trip.live_occupancy));

        let producer = SampleProducer::new(
            self.trips.clone(),
            pipeline.clone(),
            self.position.clone(),
            occupancy.clone(),
            self.device_id.clone(),
            trip.trip_id.clone(),
            self.sample_interval,
            self.max_fix_age,
        );
        let producer_task = tokio::spawn(async move { producer.run().await });

        // One drain per offline-to-online edge; overlap with an already
        // running drain collapses inside the pipeline guard
        let drain_pipeline = pipeline.clone();
        let mut online = self.online.clone();
        let trip_id = trip.trip_id.clone();
        let reconnect_task = tokio::spawn(async move {
            while online.changed().await.is_ok() {
                if !*online.borrow() {
                    continue;
                }
                info!("Back online, draining queue for trip '{}'", trip_id);
                if let Err(e) = drain_pipeline.flush().await {
                    warn!("Reconnect drain failed for trip '{}': {}", trip_id, e);
                }
            }
        });

        ActiveSession {
            trip_id: trip.trip_id.clone(),
            pipeline,
            occupancy,
            producer_task,
            reconnect_task,
        }
    }
}
