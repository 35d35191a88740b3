//! ---
//! fleet_section: "15-testing-qa-runbook"
//! fleet_subsection: "integration-tests"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Validation of the configuration files shipped with the repository."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;
use std::time::Duration;

use steamfleet_common::{AppConfig, LogFormat};

fn read(path: &str) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let full = Path::new(manifest_dir).join("..").join(path);
    fs::read_to_string(&full)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", full.display(), err))
}

#[test]
fn shipped_config_parses_and_validates() {
    let config: AppConfig = read("configs/steamfleet.toml")
        .parse()
        .expect("configs/steamfleet.toml should be valid");
    assert_eq!(config.timing.scan_interval, Duration::from_millis(3000));
    assert_eq!(config.timing.reconnect_interval, Duration::from_secs(15));
    assert_eq!(config.timing.shutdown_delay, Duration::from_millis(1000));
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.fleet.device_name(1), "SteamSensor");
    assert_eq!(
        config.platform.uri().unwrap(),
        "ws://localhost:8080/Thingworx/WS"
    );
}

#[test]
fn shipped_config_carries_no_credentials() {
    let config: AppConfig = read("configs/steamfleet.toml").parse().unwrap();
    assert!(config.platform.app_key.is_none());
    assert!(config.platform.require_credentials().is_err());
}

#[test]
fn shipped_config_uses_frontmatter() {
    let content = read("configs/steamfleet.toml");
    assert!(
        content.starts_with("# ---"),
        "configs/steamfleet.toml must include frontmatter header"
    );
    assert!(content.contains("fleet_description:"));
}
