//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "binary"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Binary entrypoint for the steam fleet daemon."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use steamfleet_common::{init_tracing, AppConfig, LogFormat, SystemClock};
use steamfleet_device::{names, DeviceRegistry};
use steamfleet_remote::{LoopbackOptions, LoopbackPlatform};
use steamfleet_supervisor::{
    new_registry, provision_fleet, ConnectionState, ConnectionSupervisor, FleetMetrics,
    SupervisorSettings,
};
use tokio::signal;
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "steamfleetd";
const DEFAULT_CONFIG: &str = "configs/steamfleet.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Virtual steam sensor fleet daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(short = 'H', long, help = "Platform host name")]
    host: Option<String>,

    #[arg(short = 'p', long, help = "Platform port")]
    port: Option<u16>,

    #[arg(
        short = 'k',
        long,
        env = "STEAMFLEET_APP_KEY",
        hide_env_values = true,
        help = "Application key used to authenticate with the platform"
    )]
    app_key: Option<String>,

    #[arg(short = 'f', long, help = "Force a TLS connection regardless of port")]
    force_tls: bool,

    #[arg(short = 'd', long, help = "Accept invalid TLS certificates")]
    ignore_tls_errors: bool,

    #[arg(short = 'c', long, help = "Number of sensors to simulate")]
    count: Option<usize>,

    #[arg(short = 't', long, help = "Name prefix of the simulated sensors")]
    name_prefix: Option<String>,

    #[arg(long, value_name = "MS", help = "Scan interval in milliseconds")]
    scan_interval_ms: Option<u64>,

    #[arg(long, value_name = "SECS", help = "Delay between reconnect attempts")]
    reconnect_interval_secs: Option<u64>,

    #[arg(long, help = "Seed for deterministic signal generation")]
    seed: Option<u64>,

    #[arg(short = 'l', long, help = "Log filter, e.g. info or debug")]
    log_level: Option<String>,

    #[arg(long, value_enum, help = "Override stdout log format")]
    log_format: Option<CliLogFormat>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Json,
    Pretty,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Json => LogFormat::StructuredJson,
            CliLogFormat::Pretty => LogFormat::Pretty,
        }
    }
}

impl Cli {
    /// Command line flags win over whatever the config file provided.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.platform.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.platform.port = port;
        }
        if let Some(key) = &self.app_key {
            config.platform.app_key = Some(key.clone());
        }
        if self.force_tls {
            config.platform.force_tls = true;
        }
        if self.ignore_tls_errors {
            config.platform.ignore_tls_errors = true;
        }
        if let Some(count) = self.count {
            config.fleet.count = count;
        }
        if let Some(prefix) = &self.name_prefix {
            config.fleet.name_prefix = prefix.clone();
        }
        if let Some(ms) = self.scan_interval_ms {
            config.timing.scan_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = self.reconnect_interval_secs {
            config.timing.reconnect_interval = Duration::from_secs(secs);
        }
        if let Some(seed) = self.seed {
            config.simulation.random_seed = Some(seed);
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }
    }
}

fn load_config(cli: &Cli) -> Result<(AppConfig, Option<PathBuf>)> {
    let loaded = AppConfig::load_with_source(cli.config.as_deref(), &[DEFAULT_CONFIG])?;
    let mut config = loaded.config;
    cli.apply(&mut config);
    config.validate()?;
    config.platform.require_credentials()?;
    Ok((config, loaded.source))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = load_config(&cli)?;
    let log_control = init_tracing(SERVICE_NAME, &config.logging)?;

    match &source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; running on defaults and flags"),
    }
    info!(
        uri = %config.platform.uri()?,
        tls = config.platform.uses_tls(),
        ignore_tls_errors = config.platform.ignore_tls_errors,
        "platform endpoint"
    );

    let options = LoopbackOptions::default().with_default(
        names::TEMPERATURE_LIMIT,
        config.simulation.remote_temperature_limit.into(),
    );
    let (platform, notifications) = LoopbackPlatform::new(options);
    let metrics = FleetMetrics::new(new_registry())?;
    let supervisor = ConnectionSupervisor::new(
        platform.clone(),
        Arc::new(DeviceRegistry::new()),
        SupervisorSettings::from_config(&config.timing),
        metrics.clone(),
    );
    provision_fleet(
        &config,
        platform.clone(),
        &supervisor,
        SystemClock::shared(),
        log_control,
    )
    .await?;

    let shutdown = supervisor.shutdown_handle();
    let handle = supervisor.spawn(notifications);
    info!(devices = config.fleet.count, "daemon running; waiting for termination signal");

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => {
                info!("ctrl-c received; shutting down");
                shutdown.request_now();
            }
            Err(err) => warn!(error = %err, "unable to listen for ctrl-c; waiting for a remote shutdown"),
        },
        _ = handle.wait_for_state(ConnectionState::Stopped) => {
            info!("shutdown requested by the platform");
        }
    }
    handle.join().await?;

    match metrics.render() {
        Ok(text) => debug!(metrics = %text, "final metrics"),
        Err(err) => warn!(error = %err, "failed to render metrics"),
    }
    info!("steamfleetd exited");
    Ok(())
}
