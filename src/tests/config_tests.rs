use super::*;

use serial_test::serial;
use std::io::Write as _;
use tempfile::NamedTempFile;

const MINIMAL_YAML: &str = r#"
service:
  base_url: http://localhost:8787
  events_addr: 127.0.0.1:8788
"#;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp config");
    file.write_all(yaml.as_bytes())
        .expect("Failed to write temp config");
    file
}

#[test]
fn test_embedded_default_config_is_valid() {
    let config = Config::default_config();
    config
        .validate()
        .expect("Embedded default config must validate");
    assert!(config.service.base_url.starts_with("http://"));
    assert!(config.log_dir.is_none());
}

#[test]
fn test_minimal_file_fills_defaults() {
    let file = write_config(MINIMAL_YAML);
    let config = Config::load(Some(file.path())).expect("Minimal config must load");

    assert_eq!(config.service.base_url, "http://localhost:8787");
    assert_eq!(config.sync.poll_interval_ms, 2000);
    assert_eq!(config.sync.reconnect_base_ms, 500);
    assert_eq!(config.sync.reconnect_max_ms, 15000);
    assert!((config.cost.usd_per_1k_tokens - 0.015).abs() < 1e-9);
}

#[test]
fn test_missing_file_is_an_error() {
    let result = Config::load(Some(Path::new("/nonexistent/briefwatch.yaml")));
    assert!(result.is_err());
}

#[test]
fn test_malformed_yaml_is_an_error() {
    let file = write_config("service: [not, a, map");
    assert!(Config::load(Some(file.path())).is_err());
}

#[test]
fn test_poll_interval_floor_is_enforced() {
    let file = write_config(
        r#"
service:
  base_url: http://localhost:8787
  events_addr: 127.0.0.1:8788
sync:
  poll_interval_ms: 50
"#,
    );
    let error = Config::load(Some(file.path())).expect_err("Floor must be enforced");
    assert!(error.to_string().contains("poll_interval_ms"));
}

#[test]
fn test_backoff_bounds_are_enforced() {
    let file = write_config(
        r#"
service:
  base_url: http://localhost:8787
  events_addr: 127.0.0.1:8788
sync:
  reconnect_base_ms: 500
  reconnect_max_ms: 100
"#,
    );
    let error = Config::load(Some(file.path())).expect_err("Bounds must be enforced");
    assert!(error.to_string().contains("reconnect_max_ms"));
}

#[test]
fn test_base_url_scheme_is_checked() {
    let file = write_config(
        r#"
service:
  base_url: ftp://localhost:8787
  events_addr: 127.0.0.1:8788
"#,
    );
    assert!(Config::load(Some(file.path())).is_err());
}

#[test]
#[serial]
fn test_env_overrides_replace_service_endpoints() {
    std::env::set_var("BRIEFWATCH_BASE_URL", "http://override:9000");
    std::env::set_var("BRIEFWATCH_EVENTS_ADDR", "override:9001");

    let file = write_config(MINIMAL_YAML);
    let config = Config::load(Some(file.path())).expect("Config must load");

    std::env::remove_var("BRIEFWATCH_BASE_URL");
    std::env::remove_var("BRIEFWATCH_EVENTS_ADDR");

    assert_eq!(config.service.base_url, "http://override:9000");
    assert_eq!(config.service.events_addr, "override:9001");
}

#[test]
#[serial]
fn test_blank_env_override_is_ignored() {
    std::env::set_var("BRIEFWATCH_BASE_URL", "");

    let file = write_config(MINIMAL_YAML);
    let config = Config::load(Some(file.path())).expect("Config must load");

    std::env::remove_var("BRIEFWATCH_BASE_URL");

    assert_eq!(config.service.base_url, "http://localhost:8787");
}

#[test]
fn test_cost_estimate_scales_per_thousand() {
    let cost = CostModel {
        usd_per_1k_tokens: 0.02,
    };
    assert!((cost.estimate(1500) - 0.03).abs() < 1e-9);
    assert!((cost.estimate(0)).abs() < 1e-12);
}

#[test]
fn test_tuning_duration_accessors() {
    let tuning = SyncTuning::default();
    assert_eq!(tuning.poll_interval(), Duration::from_millis(2000));
    assert_eq!(tuning.connect_timeout(), Duration::from_millis(3000));
    assert_eq!(tuning.reconnect_base(), Duration::from_millis(500));
    assert_eq!(tuning.reconnect_max(), Duration::from_millis(15000));
}
