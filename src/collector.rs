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

// Remote collector client

use crate::config::CollectorConfig;
use crate::protocol::{StartTripRequest, StartTripResponse, TelemetrySample};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Failures talking to the collector
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The collector answered and refused the request
    #[error("collector rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The request never completed (connectivity, DNS, timeout)
    #[error("collector unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client-side seam for the remote collector
///
/// Every call is a single attempt; retry policy belongs to the callers,
/// which queue and re-drain rather than spin on the socket.
#[async_trait]
pub trait CollectorApi: Send + Sync {
    /// Register a trip and obtain its collector-assigned id
    async fn start_trip(
        &self,
        request: &StartTripRequest,
    ) -> Result<StartTripResponse, CollectorError>;

    /// Mark a trip finished on the collector
    async fn end_trip(&self, trip_id: &str) -> Result<(), CollectorError>;

    /// Deliver a single sample
    async fn log_sample(&self, sample: &TelemetrySample) -> Result<(), CollectorError>;

    /// Whether the collector is currently reachable
    async fn health_check(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// HTTP implementation of the collector contract
pub struct HttpCollector {
    client: Client,
    base_url: String,
}

impl HttpCollector {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let mut client_builder = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout_seconds));

        // Add API token if provided
        if let Some(token) = &config.api_token {
            let mut headers = reqwest::header::HeaderMap::new();
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_value).context("Invalid API token")?,
            );
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Turn a non-2xx reply into a rejection carrying the collector's detail text
    async fn rejection(response: reqwest::Response) -> CollectorError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => body.detail,
            Err(_) => text,
        };
        CollectorError::Rejected { status, detail }
    }
}

#[async_trait]
impl CollectorApi for HttpCollector {
    async fn start_trip(
        &self,
        request: &StartTripRequest,
    ) -> Result<StartTripResponse, CollectorError> {
        let url = format!("{}/trip/start-trip", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        Ok(response.json::<StartTripResponse>().await?)
    }

    async fn end_trip(&self, trip_id: &str) -> Result<(), CollectorError> {
        let url = format!("{}/trip/end-trip/{}", self.base_url, trip_id);
        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        Ok(())
    }

    async fn log_sample(&self, sample: &TelemetrySample) -> Result<(), CollectorError> {
        let url = format!("{}/log/", self.base_url);
        let response = self.client.post(&url).json(sample).send().await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        Ok(())
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Health check failed with status: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Health check error: {}", e);
                false
            }
        }
    }
}
