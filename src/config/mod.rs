// Configuration module for ruta-recorder
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::ConfigLoader;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
    let mut config = load_config(path)?;

    // Allow environment variables to override config values
    if let Ok(device_id) = std::env::var("DEVICE_ID") {
        config.recorder.device_id = Some(device_id);
    }

    if let Ok(collector_url) = std::env::var("COLLECTOR_URL") {
        config.collector.base_url = collector_url;
    }

    if let Ok(api_token) = std::env::var("COLLECTOR_API_TOKEN") {
        config.collector.api_token = Some(api_token);
    }

    if let Ok(gpsd_addr) = std::env::var("GPSD_ADDR") {
        config.gps.gpsd_addr = gpsd_addr;
    }

    Ok(config)
}
