// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        // Substitute environment variables
        let content = Self::substitute_env_vars(&content);

        // Parse YAML
        let config: RecorderConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        // Validate configuration
        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${DEVICE_ID:-RS-OFFLINE1} -> RS-OFFLINE1 (if DEVICE_ID not set)
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").unwrap();

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        // Keep original if no default and var not found
                        format!("${{{}}}", var_name)
                    }
                }
            }
        }).to_string()
    }

    /// Validate configuration
    fn validate(config: &RecorderConfig) -> Result<()> {
        // Validate collector endpoint
        if config.collector.base_url.is_empty() {
            bail!("collector.base_url cannot be empty");
        }

        if !config.collector.base_url.starts_with("http://")
            && !config.collector.base_url.starts_with("https://")
        {
            bail!("collector.base_url must start with http:// or https://");
        }

        if config.collector.timeout_seconds == 0 {
            bail!("collector.timeout_seconds must be > 0");
        }

        // Validate store paths
        if config.store.data_dir.is_empty() {
            bail!("store.data_dir cannot be empty");
        }

        if config.store.export_dir.is_empty() {
            bail!("store.export_dir cannot be empty");
        }

        // Validate recorder timing
        if config.recorder.sample_interval_seconds == 0 {
            bail!("recorder.sample_interval_seconds must be > 0");
        }

        if config.recorder.max_fix_age_seconds == 0 {
            bail!("recorder.max_fix_age_seconds must be > 0");
        }

        if config.recorder.probe_interval_seconds == 0 {
            bail!("recorder.probe_interval_seconds must be > 0");
        }

        // Validate addresses
        if config.recorder.control.bind_addr.is_empty() {
            bail!("control.bind_addr cannot be empty");
        }

        if config.gps.gpsd_addr.is_empty() {
            bail!("gps.gpsd_addr cannot be empty");
        }

        Ok(())
    }
}
