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

// Collector reachability tracking

use crate::collector::CollectorApi;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Polls the collector and publishes online/offline transitions
///
/// The channel value only changes on a transition, so a reconnect wakes
/// each watcher exactly once. Being offline gates nothing here; capture
/// and direct sends carry on and fail into the queue on their own.
pub struct ConnectivityMonitor {
    collector: Arc<dyn CollectorApi>,
    probe_interval: Duration,
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(collector: Arc<dyn CollectorApi>, probe_interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            collector,
            probe_interval,
            tx,
        }
    }

    /// Subscribe to online/offline changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Run the probe loop until the task is aborted
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.probe_interval);
        loop {
            ticker.tick().await;
            let online = self.collector.health_check().await;
            let was_online = *self.tx.borrow();

            if online == was_online {
                debug!(
                    "Connectivity unchanged ({})",
                    if online { "online" } else { "offline" }
                );
                continue;
            }

            if online {
                info!("Collector reachable, back online");
            } else {
                info!("Collector unreachable, going offline");
            }
            self.tx.send_replace(online);
        }
    }
}
