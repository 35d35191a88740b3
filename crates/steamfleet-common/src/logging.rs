//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Shared primitives and utilities for the fleet runtime."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "STEAMFLEET_LOG";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Runtime switch for the rolling file log layer.
///
/// The handle is injected into components that are allowed to turn local
/// file logging on or off; no global logger configuration is mutated.
#[derive(Debug, Clone, Default)]
pub struct LogControl {
    file_enabled: Arc<AtomicBool>,
}

impl LogControl {
    pub fn new(file_enabled: bool) -> Self {
        Self {
            file_enabled: Arc::new(AtomicBool::new(file_enabled)),
        }
    }

    /// Returns `true` when the call changed the state.
    pub fn enable(&self) -> bool {
        !self.file_enabled.swap(true, Ordering::SeqCst)
    }

    /// Returns `true` when the call changed the state.
    pub fn disable(&self) -> bool {
        self.file_enabled.swap(false, Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.file_enabled.load(Ordering::Relaxed)
    }
}

/// Initialize the tracing subscriber based on configuration and environment variables.
///
/// * `STEAMFLEET_LOG` can be set to override the log filter (e.g. `info`, `debug,foo=trace`).
///   When unset the standard `RUST_LOG` variable is honoured, finally defaulting to the
///   configured level.
/// * Stdout receives either pretty or structured JSON output; a rolling daily JSON file is
///   written only while the returned [`LogControl`] is enabled.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<LogControl> {
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());

    let file_appender = daily(&config.directory, format!("{}.log", prefix));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to {} logging",
                LOG_ENV, err, config.level
            );
            EnvFilter::new(&config.level)
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)),
    };

    let fmt_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let control = LogControl::new(config.file_enabled);
    let switch = control.clone();
    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .with_filter(filter_fn(move |_| switch.is_enabled()))
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        file_logging = control.is_enabled(),
        "tracing initialised"
    );
    Ok(control)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_control_reports_transitions() {
        let control = LogControl::new(false);
        assert!(!control.is_enabled());
        assert!(control.enable());
        assert!(!control.enable());
        let shared = control.clone();
        assert!(shared.is_enabled());
        assert!(shared.disable());
        assert!(!control.is_enabled());
    }

    #[test]
    fn init_tracing_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            file_enabled: true,
            ..Default::default()
        };
        let control = init_tracing("steamfleet-test", &config).unwrap();
        assert!(control.is_enabled());
        assert!(config.directory.is_dir());
    }
}
