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

// Offline-resilient occupancy and position recorder for survey vehicles
//
// This is a field telemetry recorder for passenger occupancy surveys that:
// - Tracks one active trip at a time with a persistent history
// - Samples position and occupancy on a fixed cadence from gpsd
// - Delivers samples to an HTTP collector, queueing them while offline
// - Drains the queue on every reconnect without dropping or reordering
// - Survives restarts by keeping all trip state in a local JSON store
// - Supports local control via a line-delimited JSON TCP interface

pub mod collector;
pub mod config;
pub mod connectivity;
pub mod control;
pub mod device;
pub mod export;
pub mod pipeline;
pub mod position;
pub mod producer;
pub mod protocol;
pub mod recorder;
pub mod store;
pub mod trips;

// Re-export main types
pub use collector::{CollectorApi, CollectorError, HttpCollector};
pub use config::{load_config, load_config_with_env, RecorderConfig};
pub use connectivity::ConnectivityMonitor;
pub use control::ControlInterface;
pub use device::resolve_device_id;
pub use export::{trip_to_csv, write_trip_csv};
pub use pipeline::{queue_key, DeliveryPipeline};
pub use position::{GpsdSource, PositionFix, PositionSource};
pub use producer::SampleProducer;
pub use protocol::{
    RecorderCommand, RecorderRequest, RecorderResponse, StartTripRequest, StartTripResponse,
    TelemetrySample, TripSetup, TripStatus,
};
pub use recorder::TripRecorder;
pub use store::LocalStore;
pub use trips::{Trip, TripCompletion, TripLogEntry, TripManager, TripPatch};
