// Configuration system integration tests

use ruta_recorder::config::{load_config, load_config_with_env, RecorderConfig};
use std::fs;
use std::path::PathBuf;

#[test]
fn test_load_default_config() {
    let config_path = PathBuf::from("config/default.yaml");

    if config_path.exists() {
        let result = load_config(&config_path);
        assert!(result.is_ok(), "Failed to load default config: {:?}", result.err());

        let config = result.unwrap();

        // Verify defaults
        assert_eq!(config.collector.timeout_seconds, 10);
        assert_eq!(config.recorder.sample_interval_seconds, 3);
        assert_eq!(config.recorder.max_fix_age_seconds, 10);
        assert_eq!(config.recorder.probe_interval_seconds, 5);
        assert_eq!(config.recorder.control.bind_addr, "127.0.0.1:7600");
        assert_eq!(config.logging.level, "info");
    }
}

#[test]
fn test_config_with_env_vars() {
    // Create temporary config file
    let temp_config = r#"
collector:
  base_url: ${TEST_COLLECTOR:-http://default:8000}
  timeout_seconds: 15

store:
  data_dir: ${TEST_DATA_DIR:-data}
  export_dir: exports

recorder:
  sample_interval_seconds: 2
  max_fix_age_seconds: 8
  probe_interval_seconds: 4
  control:
    bind_addr: 127.0.0.1:7611

gps:
  gpsd_addr: 127.0.0.1:2947

logging:
  level: debug
  format: text
"#;

    let temp_path = PathBuf::from("/tmp/test_recorder_config.yaml");
    fs::write(&temp_path, temp_config).expect("Failed to write temp config");

    // Set environment variable
    std::env::set_var("TEST_COLLECTOR", "http://survey-hub:9000");

    let result = load_config(&temp_path);
    assert!(result.is_ok(), "Failed to load config with env vars: {:?}", result.err());

    let config = result.unwrap();

    // Verify env var substitution
    assert_eq!(config.collector.base_url, "http://survey-hub:9000");
    assert_eq!(config.store.data_dir, "data"); // Uses default
    assert_eq!(config.collector.timeout_seconds, 15);
    assert_eq!(config.recorder.sample_interval_seconds, 2);

    // Cleanup
    fs::remove_file(temp_path).ok();
    std::env::remove_var("TEST_COLLECTOR");
}

#[test]
fn test_config_validation() {
    let invalid_config = r#"
collector:
  base_url: http://localhost:8000
  timeout_seconds: 10

recorder:
  sample_interval_seconds: 0  # INVALID: must be > 0

logging:
  level: info
  format: text
"#;

    let temp_path = PathBuf::from("/tmp/invalid_recorder_config.yaml");
    fs::write(&temp_path, invalid_config).expect("Failed to write temp config");

    let result = load_config(&temp_path);
    assert!(result.is_err(), "Expected validation error for invalid config");
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("sample_interval_seconds"));

    // Cleanup
    fs::remove_file(temp_path).ok();
}

#[test]
fn test_minimal_config_gets_defaults() {
    let minimal_config = r#"
collector:
  base_url: http://localhost:8000
"#;

    let temp_path = PathBuf::from("/tmp/minimal_recorder_config.yaml");
    fs::write(&temp_path, minimal_config).expect("Failed to write temp config");

    let config = load_config(&temp_path).unwrap();

    assert_eq!(config.store.data_dir, "data");
    assert_eq!(config.store.export_dir, "exports");
    assert_eq!(config.recorder.sample_interval_seconds, 3);
    assert_eq!(config.recorder.device_id, None);
    assert_eq!(config.gps.gpsd_addr, "127.0.0.1:2947");

    fs::remove_file(temp_path).ok();
}

#[test]
fn test_env_overrides_take_precedence() {
    let temp_config = r#"
collector:
  base_url: http://from-file:8000

gps:
  gpsd_addr: 127.0.0.1:2947
"#;

    let temp_path = PathBuf::from("/tmp/override_recorder_config.yaml");
    fs::write(&temp_path, temp_config).expect("Failed to write temp config");

    std::env::set_var("COLLECTOR_URL", "http://from-env:8000");
    std::env::set_var("DEVICE_ID", "RS-ENVDEVICE");

    let config = load_config_with_env(&temp_path).unwrap();
    assert_eq!(config.collector.base_url, "http://from-env:8000");
    assert_eq!(config.recorder.device_id, Some("RS-ENVDEVICE".to_string()));

    // Cleanup
    fs::remove_file(temp_path).ok();
    std::env::remove_var("COLLECTOR_URL");
    std::env::remove_var("DEVICE_ID");
}

#[test]
fn test_config_defaults() {
    let config = RecorderConfig::default();

    assert_eq!(config.collector.base_url, "http://localhost:8000");
    assert_eq!(config.collector.timeout_seconds, 10);
    assert_eq!(config.store.data_dir, "data");
    assert_eq!(config.store.export_dir, "exports");
    assert_eq!(config.recorder.sample_interval_seconds, 3);
    assert_eq!(config.recorder.max_fix_age_seconds, 10);
    assert_eq!(config.recorder.probe_interval_seconds, 5);
    assert_eq!(config.recorder.control.bind_addr, "127.0.0.1:7600");
    assert_eq!(config.gps.gpsd_addr, "127.0.0.1:2947");
    assert_eq!(config.logging.level, "info");
}
