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

// Trip state: one active trip slot plus completed-trip history

use crate::store::LocalStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const ACTIVE_TRIP_KEY: &str = "active_trip";
pub const TRIP_HISTORY_KEY: &str = "trips";

/// One point captured during a trip
///
/// Older recordings carried the occupancy under `occupancy`, newer ones
/// under `occupancy_count`; readers go through `recorded_occupancy`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripLogEntry {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupancy_count: Option<u32>,
}

impl TripLogEntry {
    /// Occupancy recorded for this entry, whichever field carried it
    pub fn recorded_occupancy(&self) -> u32 {
        self.occupancy_count.or(self.occupancy).unwrap_or(0)
    }
}

/// A survey trip, active or completed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub trip_id: String,
    pub route: String,
    pub direction: String,
    pub jeep_code: String,
    pub capacity: u32,
    pub starting_occupancy: u32,
    pub live_occupancy: u32,
    #[serde(default)]
    pub logs: Vec<TripLogEntry>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_occupancy: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_remaining: Option<usize>,
}

impl Trip {
    /// More passengers aboard than the vehicle is rated for
    ///
    /// Occupancy itself stays unclamped; going over capacity is surfaced,
    /// not prevented, since surveys record what actually happens.
    pub fn is_over_capacity(&self) -> bool {
        self.capacity > 0 && self.live_occupancy > self.capacity
    }
}

/// Descriptor for a trip about to start
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub trip_id: String,
    pub route: String,
    pub direction: String,
    pub jeep_code: String,
    pub capacity: u32,
    pub starting_occupancy: u32,
}

/// Field-level update for the active trip
#[derive(Debug, Clone, Default)]
pub struct TripPatch {
    pub live_occupancy: Option<u32>,
}

/// Final fields merged into a trip at completion
#[derive(Debug, Clone)]
pub struct TripCompletion {
    pub final_occupancy: u32,
    pub logs_sent: u64,
    pub queue_remaining: usize,
}

/// Single writer for the active-trip slot and the trip history
///
/// Nothing else touches those keys; everyone who needs trip state goes
/// through here. Writes serialize on an internal mutex, so a capture tick
/// appending a log entry and a boarding tap updating occupancy cannot
/// overwrite each other.
pub struct TripManager {
    store: Arc<LocalStore>,
    // Serializes read-modify-write on both keys; never held across a
    // network call
    state_mutex: Mutex<()>,
}

impl TripManager {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            state_mutex: Mutex::new(()),
        }
    }

    /// Start a trip, stamping it with the local clock
    ///
    /// A trip still sitting in the active slot gets overwritten and never
    /// reaches history.
    pub async fn start_trip(&self, new_trip: NewTrip) -> Result<Trip> {
        let _guard = self.state_mutex.lock().await;

        if let Some(previous) = self.active_trip().await {
            warn!(
                "Discarding active trip '{}' in favor of '{}'",
                previous.trip_id, new_trip.trip_id
            );
        }

        let trip = Trip {
            trip_id: new_trip.trip_id,
            route: new_trip.route,
            direction: new_trip.direction,
            jeep_code: new_trip.jeep_code,
            capacity: new_trip.capacity,
            starting_occupancy: new_trip.starting_occupancy,
            live_occupancy: new_trip.starting_occupancy,
            logs: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            final_occupancy: None,
            logs_sent: None,
            queue_remaining: None,
        };

        self.store.write(ACTIVE_TRIP_KEY, &trip).await?;
        info!(
            "Started trip '{}' on route '{}' ({})",
            trip.trip_id, trip.route, trip.direction
        );
        Ok(trip)
    }

    /// Current active trip, if any; a corrupted slot reads as none
    pub async fn active_trip(&self) -> Option<Trip> {
        self.store.read(ACTIVE_TRIP_KEY).await
    }

    /// Merge a patch into the active trip
    pub async fn update_active_trip(&self, patch: TripPatch) -> Result<Option<Trip>> {
        let _guard = self.state_mutex.lock().await;

        let mut trip = match self.active_trip().await {
            Some(trip) => trip,
            None => return Ok(None),
        };

        if let Some(occupancy) = patch.live_occupancy {
            trip.live_occupancy = occupancy;
        }

        self.store.write(ACTIVE_TRIP_KEY, &trip).await?;
        Ok(Some(trip))
    }

    /// Append a log entry to the active trip; without one this does nothing
    pub async fn append_log(&self, entry: TripLogEntry) -> Result<()> {
        let _guard = self.state_mutex.lock().await;

        let mut trip = match self.active_trip().await {
            Some(trip) => trip,
            None => return Ok(()),
        };

        trip.logs.push(entry);
        self.store.write(ACTIVE_TRIP_KEY, &trip).await
    }

    /// Finish the named trip and move it into history
    ///
    /// The slot is cleared only while it still holds this trip; any other
    /// occupant is left untouched and `None` comes back.
    pub async fn end_trip(&self, trip_id: &str, completion: TripCompletion) -> Result<Option<Trip>> {
        let _guard = self.state_mutex.lock().await;

        let mut trip = match self.active_trip().await {
            Some(trip) if trip.trip_id == trip_id => trip,
            _ => return Ok(None),
        };

        trip.ended_at = Some(Utc::now());
        trip.final_occupancy = Some(completion.final_occupancy);
        trip.logs_sent = Some(completion.logs_sent);
        trip.queue_remaining = Some(completion.queue_remaining);

        let mut history = self.all_trips().await;
        history.push(trip.clone());
        self.store.write(TRIP_HISTORY_KEY, &history).await?;
        self.store.remove(ACTIVE_TRIP_KEY).await?;

        info!(
            "Ended trip '{}' with {} log entries",
            trip.trip_id,
            trip.logs.len()
        );
        Ok(Some(trip))
    }

    /// All completed trips, oldest first
    pub async fn all_trips(&self) -> Vec<Trip> {
        self.store.read(TRIP_HISTORY_KEY).await.unwrap_or_default()
    }

    /// Look up one completed trip
    pub async fn find_trip(&self, trip_id: &str) -> Option<Trip> {
        self.all_trips()
            .await
            .into_iter()
            .find(|trip| trip.trip_id == trip_id)
    }

    /// Delete a completed trip; unknown ids are a no-op
    pub async fn delete_trip(&self, trip_id: &str) -> Result<()> {
        let _guard = self.state_mutex.lock().await;

        let mut history = self.all_trips().await;
        let before = history.len();
        history.retain(|trip| trip.trip_id != trip_id);

        if history.len() == before {
            return Ok(());
        }

        info!("Deleted trip '{}'", trip_id);
        self.store.write(TRIP_HISTORY_KEY, &history).await
    }
}
