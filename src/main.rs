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

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod collector;
mod config;
mod connectivity;
mod control;
mod device;
mod export;
mod pipeline;
mod position;
mod producer;
mod protocol;
mod recorder;
mod store;
mod trips;

use collector::{CollectorApi, HttpCollector};
use config::load_config_with_env;
use connectivity::ConnectivityMonitor;
use control::ControlInterface;
use device::resolve_device_id;
use position::{GpsdSource, PositionSource};
use recorder::TripRecorder;
use store::LocalStore;

/// Ruta Recorder - Record vehicle occupancy and position surveys
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Device ID (overrides config file)
    #[arg(short, long)]
    device_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration from file
    let mut recorder_config = load_config_with_env(&args.config)?;

    // Apply CLI overrides
    if let Some(device_id) = args.device_id {
        recorder_config.recorder.device_id = Some(device_id);
    }

    // Initialize tracing with configured level
    let log_level = match recorder_config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Ruta Recorder");
    info!("Loaded configuration from: {:?}", args.config);
    info!("Collector: {}", recorder_config.collector.base_url);

    // Open the local store
    let store = Arc::new(LocalStore::new(&recorder_config.store.data_dir));
    store.initialize().await?;

    // Resolve device identity
    let device_id =
        resolve_device_id(&store, recorder_config.recorder.device_id.as_deref()).await?;
    info!("Device ID: {}", device_id);

    // Create the collector client
    let collector: Arc<dyn CollectorApi> =
        Arc::new(HttpCollector::new(&recorder_config.collector)?);

    // Start the position feed
    let (position_tx, position_rx) = watch::channel(None);
    let gps_source = GpsdSource::new(recorder_config.gps.gpsd_addr.clone());
    info!("Position source: gpsd at {}", recorder_config.gps.gpsd_addr);
    tokio::spawn(async move {
        if let Err(e) = gps_source.run(position_tx).await {
            error!("Position source stopped: {:#}", e);
        }
    });

    // Start the connectivity probe
    let monitor = ConnectivityMonitor::new(
        collector.clone(),
        Duration::from_secs(recorder_config.recorder.probe_interval_seconds),
    );
    let online_rx = monitor.subscribe();
    tokio::spawn(async move {
        monitor.run().await;
    });

    // Create the trip recorder
    let trip_recorder = Arc::new(TripRecorder::new(
        store.clone(),
        collector.clone(),
        device_id.clone(),
        &recorder_config,
        position_rx,
        online_rx,
    ));

    // Pick up a trip left open by a previous run
    if let Some(trip) = trip_recorder.resume_active_trip().await? {
        info!("Resumed trip '{}' from a previous run", trip.trip_id);
    }

    // Start control interface
    let bind_addr = recorder_config.recorder.control.bind_addr.clone();
    let control_interface = ControlInterface::new(trip_recorder.clone(), bind_addr);

    // Run the control interface (blocks until Ctrl+C)
    tokio::select! {
        result = control_interface.run() => {
            if let Err(e) = result {
                error!("Control interface error: {}", e);
            }
            info!("Control interface stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Cleanup
    trip_recorder.shutdown().await?;
    info!("Ruta Recorder shut down successfully");

    Ok(())
}
