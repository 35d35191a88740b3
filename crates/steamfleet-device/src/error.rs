//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Error taxonomy for devices, sessions and the registry."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;

use crate::value::BaseType;

/// Failures reported by the session to the remote platform.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("remote operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("session is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device {device} is not usable: {reason}")]
    Precondition { device: String, reason: String },
    #[error("device {device} has no property named {property}")]
    UnknownProperty { device: String, property: String },
    #[error("property {property} expects {expected} but received {actual}")]
    TypeMismatch {
        property: String,
        expected: BaseType,
        actual: BaseType,
    },
    #[error("property {property} is read-only")]
    ReadOnlyProperty { property: String },
    #[error("invalid thing shape: {0}")]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl DeviceError {
    pub fn precondition(device: impl Into<String>, reason: impl Into<String>) -> Self {
        DeviceError::Precondition {
            device: device.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a device named {0} is already registered")]
    DuplicateName(String),
}

/// Problems found while validating the static thing shape tables.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("property {0} is declared more than once")]
    DuplicateProperty(String),
    #[error("event {0} is declared more than once")]
    DuplicateEvent(String),
    #[error("{owner} declares field {field} more than once")]
    DuplicateField { owner: String, field: String },
    #[error("{owner} field {field} has no declared type")]
    UntypedField { owner: String, field: String },
    #[error("event {event} references unknown data shape {data_shape}")]
    UnknownDataShape { event: String, data_shape: String },
}
