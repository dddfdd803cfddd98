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

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::protocol::{RecorderCommand, RecorderRequest, RecorderResponse};
use crate::recorder::TripRecorder;

/// Control interface serving newline-delimited JSON commands over TCP
///
/// One request per line, one response per line. This is the operator
/// surface: trip lifecycle, occupancy taps, status, history.
pub struct ControlInterface {
    recorder: Arc<TripRecorder>,
    bind_addr: String,
}

impl ControlInterface {
    pub fn new(recorder: Arc<TripRecorder>, bind_addr: String) -> Self {
        Self {
            recorder,
            bind_addr,
        }
    }

    /// Run the control interface (blocks until stopped)
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .context(format!("Failed to bind control socket {}", self.bind_addr))?;
        info!("Control interface listening on {}", self.bind_addr);
        self.serve(listener).await
    }

    /// Accept loop over an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            info!("Control connection from {}", peer);

            let recorder = self.recorder.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::serve_connection(stream, recorder).await {
                    error!("Error on control connection from {}: {}", peer, e);
                }
            });
        }
    }

    async fn serve_connection(stream: TcpStream, recorder: Arc<TripRecorder>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<RecorderRequest>(&line) {
                Ok(request) => Self::handle_request(request, &recorder).await,
                Err(e) => {
                    warn!("Malformed control request: {}", e);
                    RecorderResponse::error(format!("Malformed request: {}", e))
                }
            };

            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            writer.write_all(&payload).await?;
        }

        Ok(())
    }

    async fn handle_request(request: RecorderRequest, recorder: &TripRecorder) -> RecorderResponse {
        info!("Processing command: {:?}", request.command);

        match request.command {
            RecorderCommand::StartTrip => match request.trip {
                Some(setup) => match recorder.start_trip(setup).await {
                    Ok(trip) => RecorderResponse::success(format!("Trip '{}' started", trip.trip_id))
                        .with_trip(trip),
                    Err(e) => RecorderResponse::error(format!("{:#}", e)),
                },
                None => RecorderResponse::error("Missing trip details".to_string()),
            },
            RecorderCommand::Board => match recorder.board().await {
                Ok(occupancy) => RecorderResponse::success(format!("Occupancy now {}", occupancy)),
                Err(e) => RecorderResponse::error(format!("{:#}", e)),
            },
            RecorderCommand::Alight => match recorder.alight().await {
                Ok(occupancy) => RecorderResponse::success(format!("Occupancy now {}", occupancy)),
                Err(e) => RecorderResponse::error(format!("{:#}", e)),
            },
            RecorderCommand::EndTrip => match recorder.end_trip().await {
                Ok(Some(trip)) => {
                    RecorderResponse::success(format!("Trip '{}' ended", trip.trip_id)).with_trip(trip)
                }
                Ok(None) => RecorderResponse::error("No trip in progress".to_string()),
                Err(e) => RecorderResponse::error(format!("{:#}", e)),
            },
            RecorderCommand::Status => {
                RecorderResponse::success("OK".to_string()).with_status(recorder.status().await)
            }
            RecorderCommand::ListTrips => {
                let trips = recorder.list_trips().await;
                RecorderResponse::success(format!("{} completed trips", trips.len()))
                    .with_trips(trips)
            }
            RecorderCommand::DeleteTrip => {
                let trip_id = request.trip_id.unwrap_or_default();
                match recorder.delete_trip(&trip_id).await {
                    Ok(()) => RecorderResponse::success(format!("Trip '{}' deleted", trip_id)),
                    Err(e) => RecorderResponse::error(format!("{:#}", e)),
                }
            }
            RecorderCommand::ExportTrip => {
                let trip_id = request.trip_id.unwrap_or_default();
                match recorder.export_trip(&trip_id).await {
                    Ok(csv) => RecorderResponse::success(format!("Trip '{}' exported", trip_id))
                        .with_csv(csv),
                    Err(e) => RecorderResponse::error(format!("{:#}", e)),
                }
            }
        }
    }
}
