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

use crate::trips::Trip;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Command types for trip control
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RecorderCommand {
    StartTrip,
    Board,
    Alight,
    EndTrip,
    Status,
    ListTrips,
    DeleteTrip,
    ExportTrip,
}

/// Operator-supplied details for a new trip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripSetup {
    pub route: String,
    pub direction: String,
    pub jeep_code: String,
    pub capacity: u32,
    #[serde(default)]
    pub starting_occupancy: u32,
}

impl TripSetup {
    /// Check operator input before anything goes over the wire
    pub fn validate(&self) -> Result<()> {
        if self.route.trim().is_empty() {
            bail!("route must not be empty");
        }
        if self.direction.trim().is_empty() {
            bail!("direction must not be empty");
        }
        if self.jeep_code.trim().is_empty() {
            bail!("jeep_code must not be empty");
        }
        if self.capacity == 0 {
            bail!("capacity must be greater than zero");
        }
        if self.starting_occupancy > self.capacity {
            bail!(
                "starting_occupancy ({}) cannot exceed capacity ({})",
                self.starting_occupancy,
                self.capacity
            );
        }
        Ok(())
    }
}

/// Request message for trip control operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderRequest {
    pub command: RecorderCommand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip: Option<TripSetup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
}

/// Response message for trip control operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip: Option<Trip>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trips: Option<Vec<Trip>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TripStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv: Option<String>,
}

impl RecorderResponse {
    pub fn success(message: String) -> Self {
        Self {
            success: true,
            message,
            trip: None,
            trips: None,
            status: None,
            csv: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            message,
            trip: None,
            trips: None,
            status: None,
            csv: None,
        }
    }

    pub fn with_trip(mut self, trip: Trip) -> Self {
        self.trip = Some(trip);
        self
    }

    pub fn with_trips(mut self, trips: Vec<Trip>) -> Self {
        self.trips = Some(trips);
        self
    }

    pub fn with_status(mut self, status: TripStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_csv(mut self, csv: String) -> Self {
        self.csv = Some(csv);
        self
    }
}

/// Live recorder status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    pub device_id: String,
    pub occupancy: u32,
    pub capacity: u32,
    pub over_capacity: bool,
    pub online: bool,
    pub has_fix: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_accuracy: Option<f64>,
    pub queued: usize,
    pub logs_sent: u64,
    pub log_count: usize,
}

/// Body for the collector's start-trip endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTripRequest {
    pub route_id: String,
    pub direction: String,
    pub recorder_id: String,
    pub jeep_code: String,
    pub official_capacity: u32,
    pub starting_occupancy: u32,
}

/// Collector's reply to start-trip; the trip id is minted remotely
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTripResponse {
    pub trip_id: String,
    pub start_time: String,
}

/// One occupancy/position sample bound for the collector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    pub trip_id: String,
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub occupancy_count: u32,
    pub timestamp: DateTime<Utc>,
}
