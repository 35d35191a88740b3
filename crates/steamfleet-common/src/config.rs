//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Shared primitives and utilities for the fleet runtime."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_port() -> u16 {
    8080
}

fn default_endpoint_path() -> String {
    "/Thingworx/WS".to_owned()
}

fn default_device_count() -> usize {
    1
}

fn default_name_prefix() -> String {
    "SteamSensor".to_owned()
}

fn default_scan_interval() -> Duration {
    Duration::from_millis(3000)
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_property_push_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_event_push_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_remote_read_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_shutdown_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_temperature_min() -> f64 {
    400.0
}

fn default_temperature_max() -> f64 {
    440.0
}

fn default_pressure_min() -> f64 {
    18.0
}

fn default_pressure_max() -> f64 {
    23.0
}

fn default_remote_temperature_limit() -> f64 {
    430.0
}

fn default_inlet_valve_period() -> u32 {
    15
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// Primary configuration object for the fleet daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "STEAMFLEET_CONFIG";

    /// Load configuration honouring, in order: an explicit path, the
    /// `STEAMFLEET_CONFIG` override, the first existing candidate, and finally
    /// the built-in defaults.
    pub fn load_with_source<P: AsRef<Path>>(
        explicit: Option<&Path>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        if let Some(path) = explicit {
            let config = Self::from_path(path)?;
            return Ok(LoadedAppConfig {
                config,
                source: Some(path.to_path_buf()),
            });
        }

        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!("no configuration file found; using built-in defaults");
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.platform.validate()?;
        self.fleet.validate()?;
        self.timing.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Location and credentials of the remote supervisory platform.
#[derive(Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing)]
    pub app_key: Option<String>,
    #[serde(default)]
    pub force_tls: bool,
    #[serde(default)]
    pub ignore_tls_errors: bool,
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            app_key: None,
            force_tls: false,
            ignore_tls_errors: false,
            endpoint_path: default_endpoint_path(),
        }
    }
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("app_key", &self.app_key.as_ref().map(|_| "<redacted>"))
            .field("force_tls", &self.force_tls)
            .field("ignore_tls_errors", &self.ignore_tls_errors)
            .field("endpoint_path", &self.endpoint_path)
            .finish()
    }
}

impl PlatformConfig {
    /// TLS is implied by the well-known secure ports even when not forced.
    pub fn uses_tls(&self) -> bool {
        self.force_tls || self.port == 443 || self.port == 8443
    }

    /// Endpoint URI of the platform session.
    pub fn uri(&self) -> Result<String> {
        let host = self
            .host
            .as_deref()
            .filter(|host| !host.trim().is_empty())
            .ok_or_else(|| anyhow!("platform host is not configured"))?;
        let scheme = if self.uses_tls() { "wss" } else { "ws" };
        Ok(format!(
            "{}://{}:{}{}",
            scheme, host, self.port, self.endpoint_path
        ))
    }

    /// Both the host and the application key are needed before a session can start.
    pub fn require_credentials(&self) -> Result<()> {
        self.uri()?;
        match self.app_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(anyhow!("platform app key is not configured")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("platform port must be non-zero"));
        }
        if !self.endpoint_path.starts_with('/') {
            return Err(anyhow!(
                "platform endpoint_path '{}' must start with '/'",
                self.endpoint_path
            ));
        }
        Ok(())
    }
}

/// Shape of the simulated fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "default_device_count")]
    pub count: usize,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default)]
    pub start_index: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            count: default_device_count(),
            name_prefix: default_name_prefix(),
            start_index: 0,
        }
    }
}

impl FleetConfig {
    /// A single-device fleet uses the bare prefix as its name.
    pub fn device_name(&self, index: usize) -> String {
        if self.count == 1 {
            self.name_prefix.clone()
        } else {
            format!("{}{}", self.name_prefix, index)
        }
    }

    pub fn device_description(&self, index: usize) -> String {
        format!("Steam Sensor #{}", index)
    }

    /// Sensor indices covered by this fleet.
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start_index..self.start_index + self.count
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(anyhow!("fleet must contain at least one device"));
        }
        if self.name_prefix.trim().is_empty() {
            return Err(anyhow!("fleet name_prefix must not be empty"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_scan_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub scan_interval: Duration,
    #[serde(default = "default_reconnect_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub reconnect_interval: Duration,
    #[serde(default = "default_property_push_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub property_push_interval: Duration,
    #[serde(default = "default_event_push_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub event_push_interval: Duration,
    #[serde(default = "default_remote_read_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub remote_read_timeout: Duration,
    #[serde(default = "default_shutdown_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub shutdown_delay: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            reconnect_interval: default_reconnect_interval(),
            property_push_interval: default_property_push_interval(),
            event_push_interval: default_event_push_interval(),
            remote_read_timeout: default_remote_read_timeout(),
            shutdown_delay: default_shutdown_delay(),
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("scan_interval", self.scan_interval),
            ("reconnect_interval", self.reconnect_interval),
            ("remote_read_timeout", self.remote_read_timeout),
        ] {
            if value.is_zero() {
                return Err(anyhow!("timing.{} must be greater than zero", name));
            }
        }
        Ok(())
    }
}

/// Parameters of the simulated signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default = "default_temperature_min")]
    pub temperature_min: f64,
    #[serde(default = "default_temperature_max")]
    pub temperature_max: f64,
    #[serde(default = "default_pressure_min")]
    pub pressure_min: f64,
    #[serde(default = "default_pressure_max")]
    pub pressure_max: f64,
    #[serde(default = "default_inlet_valve_period")]
    pub inlet_valve_closed_every_secs: u32,
    /// TemperatureLimit the loopback platform reports to devices on their first fetch.
    #[serde(default = "default_remote_temperature_limit")]
    pub remote_temperature_limit: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            random_seed: None,
            temperature_min: default_temperature_min(),
            temperature_max: default_temperature_max(),
            pressure_min: default_pressure_min(),
            pressure_max: default_pressure_max(),
            inlet_valve_closed_every_secs: default_inlet_valve_period(),
            remote_temperature_limit: default_remote_temperature_limit(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.temperature_min < self.temperature_max) {
            return Err(anyhow!(
                "simulation temperature range [{}, {}) is empty",
                self.temperature_min,
                self.temperature_max
            ));
        }
        if !(self.pressure_min < self.pressure_max) {
            return Err(anyhow!(
                "simulation pressure range [{}, {}) is empty",
                self.pressure_min,
                self.pressure_max
            ));
        }
        if self.inlet_valve_closed_every_secs == 0 || self.inlet_valve_closed_every_secs > 60 {
            return Err(anyhow!(
                "simulation inlet_valve_closed_every_secs must be within 1..=60"
            ));
        }
        if !self.remote_temperature_limit.is_finite() || self.remote_temperature_limit < 0.0 {
            return Err(anyhow!(
                "simulation remote_temperature_limit must be a non-negative number"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether the rolling file layer starts enabled. Devices toggle it at runtime.
    #[serde(default)]
    pub file_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            level: default_log_level(),
            file_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_reference_timings() {
        let config = AppConfig::default();
        assert_eq!(config.timing.scan_interval, Duration::from_secs(3));
        assert_eq!(config.timing.reconnect_interval, Duration::from_secs(15));
        assert_eq!(config.timing.property_push_interval, Duration::from_secs(15));
        assert_eq!(config.timing.event_push_interval, Duration::from_secs(60));
        assert_eq!(config.timing.remote_read_timeout, Duration::from_secs(10));
        assert_eq!(config.timing.shutdown_delay, Duration::from_secs(1));
        assert_eq!(config.fleet.count, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let config: AppConfig = r#"
            [platform]
            host = "platform.local"
            port = 443
            app_key = "secret"

            [fleet]
            count = 3
            name_prefix = "Boiler"

            [timing]
            scan_interval = 500
            reconnect_interval = 2
        "#
        .parse()
        .unwrap();
        assert_eq!(config.fleet.count, 3);
        assert_eq!(config.timing.scan_interval, Duration::from_millis(500));
        assert_eq!(config.timing.reconnect_interval, Duration::from_secs(2));
        assert_eq!(config.timing.event_push_interval, Duration::from_secs(60));
        assert_eq!(
            config.platform.uri().unwrap(),
            "wss://platform.local:443/Thingworx/WS"
        );
        assert!(config.platform.require_credentials().is_ok());
    }

    #[test]
    fn plain_port_uses_ws_scheme_unless_forced() {
        let mut platform = PlatformConfig {
            host: Some("localhost".into()),
            ..Default::default()
        };
        assert_eq!(platform.uri().unwrap(), "ws://localhost:8080/Thingworx/WS");
        platform.force_tls = true;
        assert_eq!(platform.uri().unwrap(), "wss://localhost:8080/Thingworx/WS");
    }

    #[test]
    fn missing_credentials_are_reported() {
        let platform = PlatformConfig {
            host: Some("localhost".into()),
            ..Default::default()
        };
        let err = platform.require_credentials().unwrap_err();
        assert!(err.to_string().contains("app key"));
        assert!(PlatformConfig::default().uri().is_err());
    }

    #[test]
    fn debug_output_redacts_app_key() {
        let platform = PlatformConfig {
            app_key: Some("super-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{:?}", platform);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn single_device_fleet_uses_bare_prefix() {
        let single = FleetConfig::default();
        assert_eq!(single.device_name(0), "SteamSensor");

        let many = FleetConfig {
            count: 3,
            name_prefix: "Sensor".into(),
            start_index: 4,
        };
        let names: Vec<_> = many.indices().map(|i| many.device_name(i)).collect();
        assert_eq!(names, vec!["Sensor4", "Sensor5", "Sensor6"]);
        assert_eq!(many.device_description(5), "Steam Sensor #5");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!("[fleet]\ncount = 0".parse::<AppConfig>().is_err());
        assert!("[timing]\nscan_interval = 0".parse::<AppConfig>().is_err());
        assert!("[simulation]\ntemperature_min = 500.0\ntemperature_max = 400.0"
            .parse::<AppConfig>()
            .is_err());
        assert!("[platform]\nendpoint_path = \"ws\"".parse::<AppConfig>().is_err());
    }

    #[test]
    fn loads_explicit_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[fleet]\ncount = 2\nname_prefix = \"Unit\"")?;
        file.flush()?;
        let loaded = AppConfig::load_with_source::<PathBuf>(Some(file.path()), &[])?;
        assert_eq!(loaded.config.fleet.count, 2);
        assert_eq!(loaded.source.as_deref(), Some(file.path()));
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result =
            AppConfig::load_with_source::<PathBuf>(Some(Path::new("/nonexistent/fleet.toml")), &[]);
        assert!(result.is_err());
    }
}
