//! ---
//! fleet_section: "11-simulation"
//! fleet_subsection: "01-bootstrap"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Simulation module exports and shared types."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
//! Signal generators and waypoint routes driving the virtual steam sensors.
//!
//! Every generator is an explicit value owned by its device; randomness always
//! comes from a seedable [`rand::rngs::StdRng`] so runs can be reproduced.

pub mod geo;
pub mod signals;

pub use geo::{GeoPoint, Route};
pub use signals::{RandomSignals, ScriptedSignals, SignalError, SignalRanges, SignalSource};
