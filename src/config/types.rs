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

// Configuration types for ruta-recorder

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecorderConfig {
    pub collector: CollectorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub recorder: RecorderSettings,
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            store: StoreConfig::default(),
            recorder: RecorderSettings::default(),
            gps: GpsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Remote collector endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    pub base_url: String,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_token: None,
            timeout_seconds: default_timeout(),
        }
    }
}

/// Local state and export directories
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            export_dir: default_export_dir(),
        }
    }
}

/// Recorder-specific settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecorderSettings {
    /// Fixed identity override; omitted means persisted-or-generated
    #[serde(default)]
    pub device_id: Option<String>,

    /// Seconds between capture ticks
    #[serde(default = "default_sample_interval")]
    pub sample_interval_seconds: u64,

    /// A fix older than this counts as no fix
    #[serde(default = "default_max_fix_age")]
    pub max_fix_age_seconds: u64,

    /// Seconds between collector reachability probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval_seconds: u64,

    #[serde(default)]
    pub control: ControlConfig,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            device_id: None,
            sample_interval_seconds: default_sample_interval(),
            max_fix_age_seconds: default_max_fix_age(),
            probe_interval_seconds: default_probe_interval(),
            control: ControlConfig::default(),
        }
    }
}

/// Control socket settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default = "default_control_bind")]
    pub bind_addr: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_control_bind(),
        }
    }
}

/// gpsd connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GpsConfig {
    #[serde(default = "default_gpsd_addr")]
    pub gpsd_addr: String,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            gpsd_addr: default_gpsd_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_timeout() -> u64 {
    10
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_export_dir() -> String {
    "exports".to_string()
}
fn default_sample_interval() -> u64 {
    3
}
fn default_max_fix_age() -> u64 {
    10
}
fn default_probe_interval() -> u64 {
    5
}
fn default_control_bind() -> String {
    "127.0.0.1:7600".to_string()
}
fn default_gpsd_addr() -> String {
    "127.0.0.1:2947".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
