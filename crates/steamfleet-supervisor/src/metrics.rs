//! ---
//! fleet_section: "03-persistence-logging"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Prometheus metrics recorded by the connection supervisor."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{IntCounter, IntGauge, Opts, Registry, TextEncoder};
use steamfleet_device::ScanReport;

use crate::supervisor::ConnectionState;

/// Shared registry type used across the workspace.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

#[derive(Clone, Debug)]
pub struct FleetMetrics {
    registry: SharedRegistry,
    scans_total: IntCounter,
    scan_failures_total: IntCounter,
    property_updates_total: IntCounter,
    events_total: IntCounter,
    faults_total: IntCounter,
    push_failures_total: IntCounter,
    connect_attempts_total: IntCounter,
    connection_state: IntGauge,
    registered_devices: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl FleetMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        Ok(Self {
            scans_total: counter(
                &registry,
                "steamfleet_scans_total",
                "Device scan steps executed while synchronized",
            )?,
            scan_failures_total: counter(
                &registry,
                "steamfleet_scan_failures_total",
                "Device scan steps that failed with a precondition error",
            )?,
            property_updates_total: counter(
                &registry,
                "steamfleet_property_updates_pushed_total",
                "Property values pushed to the remote platform",
            )?,
            events_total: counter(
                &registry,
                "steamfleet_events_pushed_total",
                "Events flushed to the remote platform",
            )?,
            faults_total: counter(
                &registry,
                "steamfleet_faults_raised_total",
                "Fault transitions detected across the fleet",
            )?,
            push_failures_total: counter(
                &registry,
                "steamfleet_push_failures_total",
                "Scan steps whose push was rejected by the session",
            )?,
            connect_attempts_total: counter(
                &registry,
                "steamfleet_connect_attempts_total",
                "Session connect attempts",
            )?,
            connection_state: gauge(
                &registry,
                "steamfleet_connection_state",
                "Connection state (0 disconnected, 1 connecting, 2 connected, 3 shutting down, 4 stopped)",
            )?,
            registered_devices: gauge(
                &registry,
                "steamfleet_registered_devices",
                "Devices currently held by the registry",
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_scan(&self, report: &ScanReport) {
        if !report.executed {
            return;
        }
        self.scans_total.inc();
        self.property_updates_total
            .inc_by(report.properties_pushed as u64);
        self.events_total.inc_by(report.events_pushed as u64);
        if report.fault_raised {
            self.faults_total.inc();
        }
        if report.push_failed {
            self.push_failures_total.inc();
        }
    }

    pub fn record_scan_failure(&self) {
        self.scan_failures_total.inc();
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts_total.inc();
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state.set(state.as_gauge());
    }

    pub fn set_registered_devices(&self, count: usize) {
        self.registered_devices.set(count as i64);
    }

    pub fn scans(&self) -> u64 {
        self.scans_total.get()
    }

    pub fn scan_failures(&self) -> u64 {
        self.scan_failures_total.get()
    }

    pub fn property_updates(&self) -> u64 {
        self.property_updates_total.get()
    }

    pub fn faults(&self) -> u64 {
        self.faults_total.get()
    }

    pub fn push_failures(&self) -> u64 {
        self.push_failures_total.get()
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts_total.get()
    }

    /// Text exposition of every metric in the registry.
    pub fn render(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .context("failed to encode metrics")
    }
}
