//! ---
//! fleet_section: "04-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Connection supervision and scan scheduling."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---

pub mod metrics;
pub mod provision;
pub mod shutdown;
pub mod supervisor;

pub use metrics::{new_registry, FleetMetrics, SharedRegistry};
pub use provision::provision_fleet;
pub use shutdown::{ShutdownHandle, ShutdownRequest};
pub use supervisor::{
    ConnectionState, ConnectionSupervisor, SupervisorHandle, SupervisorSettings,
};
