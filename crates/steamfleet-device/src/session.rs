//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Contract between devices and the remote platform session."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::command::{CommandOutput, DeviceCommand};
use crate::error::{DeviceError, SessionError};
use crate::event::DeviceEvent;
use crate::store::PropertyUpdate;
use crate::value::PropertyValue;

/// Connection to the remote supervisory platform.
///
/// The transport and its handshake live behind this trait; devices and the
/// supervisor only rely on the operations below. Pushes enqueue and return
/// immediately, delivery is best effort.
#[async_trait]
pub trait Session: Send + Sync {
    async fn connect(&self) -> Result<(), SessionError>;

    fn is_connected(&self) -> bool;

    /// Close the session. Further calls fail with [`SessionError::Closed`].
    async fn shutdown(&self);

    /// Announce a device to the remote side. The remote answers with
    /// [`SessionNotification::PropertiesSynchronized`] once it has caught up.
    async fn bind(&self, device: &str) -> Result<(), SessionError>;

    async fn unbind(&self, device: &str) -> Result<(), SessionError>;

    async fn read_remote_property(
        &self,
        device: &str,
        property: &str,
        timeout: Duration,
    ) -> Result<PropertyValue, SessionError>;

    fn push_properties(
        &self,
        device: &str,
        updates: Vec<PropertyUpdate>,
    ) -> Result<(), SessionError>;

    fn push_events(&self, device: &str, events: Vec<DeviceEvent>) -> Result<(), SessionError>;
}

pub type SharedSession = Arc<dyn Session>;

pub type CommandReply = oneshot::Sender<Result<CommandOutput, DeviceError>>;

pub type NotificationSender = mpsc::UnboundedSender<SessionNotification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<SessionNotification>;

/// Messages the remote side delivers asynchronously to the device engine.
#[derive(Debug)]
pub enum SessionNotification {
    PropertiesSynchronized {
        device: String,
    },
    RemotePropertyChanged {
        device: String,
        property: String,
        value: PropertyValue,
    },
    ServiceInvoked {
        device: String,
        command: DeviceCommand,
        reply: CommandReply,
    },
}

impl SessionNotification {
    pub fn device(&self) -> &str {
        match self {
            SessionNotification::PropertiesSynchronized { device }
            | SessionNotification::RemotePropertyChanged { device, .. }
            | SessionNotification::ServiceInvoked { device, .. } => device,
        }
    }
}
