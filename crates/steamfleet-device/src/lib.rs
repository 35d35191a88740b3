//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Virtual device engine for the steam fleet."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
//! Virtual steam sensors and the contracts they rely on.
//!
//! A [`VirtualDevice`] owns its typed property store, event queue and
//! bind/synchronisation flags. The supervisor drives [`VirtualDevice::scan_step`]
//! on a fixed interval; outbound data flows through a [`Session`].

pub mod command;
pub mod device;
pub mod error;
pub mod event;
pub mod registry;
pub mod schema;
pub mod session;
pub mod store;
pub mod throttle;
pub mod value;

pub use command::{CommandOutput, DeviceCommand, SensorReading, ShutdownRequester};
pub use device::{
    DeviceSettings, DeviceSnapshot, ScanReport, SyncState, VirtualDevice, VirtualDeviceBuilder,
};
pub use error::{DeviceError, RegistryError, SchemaError, SessionError};
pub use event::DeviceEvent;
pub use registry::DeviceRegistry;
pub use schema::{names, ThingShape, STEAM_SENSOR};
pub use session::{
    CommandReply, NotificationReceiver, NotificationSender, Session, SessionNotification,
    SharedSession,
};
pub use store::{PropertyStore, PropertyUpdate};
pub use throttle::PushThrottle;
pub use value::{BaseType, PropertyValue};
