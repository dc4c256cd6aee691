//! Integration tests for configuration loading

use sensmap::infra::Config;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[server]
bind_address = "127.0.0.1"
port = 9090

[grid]
cell_size_m = 20.0

[routing]
osrm_url = "http://localhost:5000"
profile = "foot"
timeout_ms = 3000
walking_speed_mps = 1.2

[storage]
snapshot_file = "/var/lib/sensmap/grid.json"
profile_file = "/var/lib/sensmap/profile.json"

[compaction]
interval_secs = 30

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.bind_address(), "127.0.0.1");
    assert_eq!(config.server_port(), 9090);
    assert_eq!(config.cell_size_m(), 20.0);
    assert_eq!(config.osrm_url(), "http://localhost:5000");
    assert_eq!(config.routing_profile(), "foot");
    assert_eq!(config.routing_timeout(), Duration::from_millis(3000));
    assert_eq!(config.walking_speed_mps(), 1.2);
    assert_eq!(config.snapshot_file(), "/var/lib/sensmap/grid.json");
    assert_eq!(config.compaction_interval(), Duration::from_secs(30));
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.server_port(), 8080);
    assert_eq!(config.cell_size_m(), 15.0);
    assert_eq!(config.routing_timeout(), Duration::from_secs(8));
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_malformed_file_falls_back_to_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[server\nport = \"eighty\"").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
    let config = Config::load_from_path(temp_file.path().to_str().unwrap());
    assert_eq!(config.server_port(), 8080);
}

#[test]
fn test_builder_overrides() {
    let config = Config::default().with_server_port(0).with_storage("a.json", "b.json");
    assert_eq!(config.server_port(), 0);
    assert_eq!(config.snapshot_file(), "a.json");
    assert_eq!(config.profile_file(), "b.json");
}
