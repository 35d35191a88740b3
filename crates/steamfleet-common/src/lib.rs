//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Shared primitives and utilities for the fleet runtime."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
//! Core shared primitives for the steam fleet workspace.
//! This crate exposes configuration loading, logging, and clock
//! utilities consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, FleetConfig, LoadedAppConfig, LoggingConfig, PlatformConfig, SimulationConfig,
    TimingConfig,
};
pub use logging::{init_tracing, LogControl, LogFormat};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
