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

// Position acquisition from a local gpsd daemon

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A usable position fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub acquired_at: DateTime<Utc>,
}

impl PositionFix {
    /// Whether this fix is recent enough to use
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        match (Utc::now() - self.acquired_at).to_std() {
            Ok(age) => age <= max_age,
            // acquired_at in the future means clock skew, keep the fix
            Err(_) => true,
        }
    }
}

/// Source of position fixes
///
/// Implementations push the freshest fix into the watch slot. A broken
/// feed leaves the last fix in place; consumers decide how stale is too
/// stale.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn run(&self, tx: watch::Sender<Option<PositionFix>>) -> Result<()>;
}

const WATCH_COMMAND: &str = "?WATCH={\"enable\":true,\"json\":true}\n";

/// gpsd report fields we care about; non-TPV classes parse too and are
/// filtered out afterwards
#[derive(Debug, Deserialize)]
struct GpsdReport {
    class: String,
    #[serde(default)]
    mode: u8,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    eph: Option<f64>,
    #[serde(default)]
    epx: Option<f64>,
    #[serde(default)]
    epy: Option<f64>,
}

impl GpsdReport {
    /// Extract a fix from a TPV report with at least a 2D solution
    fn to_fix(&self) -> Option<PositionFix> {
        if self.class != "TPV" || self.mode < 2 {
            return None;
        }

        let latitude = self.lat?;
        let longitude = self.lon?;
        let accuracy = match (self.eph, self.epx, self.epy) {
            (Some(eph), _, _) => eph,
            (None, Some(epx), Some(epy)) => epx.max(epy),
            (None, Some(epx), None) => epx,
            (None, None, Some(epy)) => epy,
            (None, None, None) => return None,
        };

        Some(PositionFix {
            latitude,
            longitude,
            accuracy,
            acquired_at: Utc::now(),
        })
    }
}

/// Position source reading TPV reports from a gpsd socket
pub struct GpsdSource {
    addr: String,
}

impl GpsdSource {
    pub fn new(addr: String) -> Self {
        Self { addr }
    }

    async fn stream_fixes(&self, tx: &watch::Sender<Option<PositionFix>>) -> Result<()> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.write_all(WATCH_COMMAND.as_bytes()).await?;
        info!("Connected to gpsd at {}", self.addr);

        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next_line().await? {
            let report: GpsdReport = match serde_json::from_str(&line) {
                Ok(report) => report,
                Err(_) => continue,
            };

            if let Some(fix) = report.to_fix() {
                debug!(
                    "Fix {:.6},{:.6} (accuracy {:.1}m)",
                    fix.latitude, fix.longitude, fix.accuracy
                );
                tx.send_replace(Some(fix));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl PositionSource for GpsdSource {
    /// Keep the watch slot fed, reconnecting with backoff on any feed error
    async fn run(&self, tx: watch::Sender<Option<PositionFix>>) -> Result<()> {
        let mut delay = Duration::from_millis(100);
        loop {
            match self.stream_fixes(&tx).await {
                Ok(()) => {
                    warn!("gpsd connection to {} closed, reconnecting", self.addr);
                    delay = Duration::from_millis(100);
                }
                Err(e) => {
                    warn!(
                        "gpsd feed error ({}): {}. Reconnecting in {:?}",
                        self.addr, e, delay
                    );
                }
            }

            // The last fix stays in the slot; staleness is the consumer's call
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(30));
        }
    }
}
