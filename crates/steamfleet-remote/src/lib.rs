//! ---
//! fleet_section: "05-networking-external-interfaces"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Loopback implementation of the platform session."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
//! In-process remote platform.
//!
//! [`LoopbackPlatform`] implements [`Session`] without any wire protocol. It
//! records what devices push, answers property reads from its own store and
//! lets tests (or an operator) inject transport failures, slow reads,
//! property changes and service invocations.

pub mod loopback;

pub use loopback::{LoopbackOptions, LoopbackPlatform};

pub use steamfleet_device::{NotificationReceiver, Session};
