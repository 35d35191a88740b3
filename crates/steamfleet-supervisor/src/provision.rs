//! ---
//! fleet_section: "04-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Creates the configured fleet of virtual steam sensors."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use steamfleet_common::{AppConfig, LogControl, SharedClock};
use steamfleet_device::{DeviceSettings, SharedSession, VirtualDevice};
use steamfleet_sim::{RandomSignals, SignalRanges};
use tracing::info;

use crate::supervisor::ConnectionSupervisor;

/// Builds `config.fleet.count` sensors and registers them with the supervisor.
///
/// With a configured seed every device gets its own deterministic stream
/// (`seed + index`); otherwise each device is seeded from entropy.
pub async fn provision_fleet(
    config: &AppConfig,
    session: SharedSession,
    supervisor: &ConnectionSupervisor,
    clock: SharedClock,
    log_control: LogControl,
) -> Result<Vec<Arc<VirtualDevice>>> {
    let ranges = SignalRanges::new(
        config.simulation.temperature_min..config.simulation.temperature_max,
        config.simulation.pressure_min..config.simulation.pressure_max,
    )
    .context("invalid simulation ranges")?;
    let settings = DeviceSettings::from_config(&config.timing, &config.simulation);
    let shutdown = Arc::new(supervisor.shutdown_handle());

    let mut devices = Vec::with_capacity(config.fleet.count);
    for index in config.fleet.indices() {
        let name = config.fleet.device_name(index);
        let signals = match config.simulation.random_seed {
            Some(seed) => RandomSignals::from_seed(ranges.clone(), seed.wrapping_add(index as u64)),
            None => RandomSignals::from_entropy(ranges.clone()),
        };
        let device = VirtualDevice::builder(name.clone(), session.clone())
            .description(config.fleet.device_description(index))
            .signals(signals)
            .settings(settings.clone())
            .clock(clock.clone())
            .log_control(log_control.clone())
            .shutdown_requester(shutdown.clone())
            .build()
            .with_context(|| format!("failed to build device {name}"))?;
        let device = supervisor
            .register_device(Arc::new(device))
            .await
            .with_context(|| format!("failed to register device {name}"))?;
        devices.push(device);
    }

    info!(
        count = devices.len(),
        prefix = %config.fleet.name_prefix,
        seeded = config.simulation.random_seed.is_some(),
        "fleet provisioned"
    );
    Ok(devices)
}
