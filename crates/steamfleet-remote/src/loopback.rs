//! ---
//! fleet_section: "05-networking-external-interfaces"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Loopback implementation of the platform session."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use steamfleet_device::{
    CommandOutput, DeviceCommand, DeviceError, DeviceEvent, NotificationReceiver,
    NotificationSender, PropertyUpdate, PropertyValue, Session, SessionError, SessionNotification,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    /// Answer every bind with `PropertiesSynchronized`.
    pub auto_synchronize: bool,
    /// Values returned for properties no device-specific value was stored for.
    pub property_defaults: HashMap<String, PropertyValue>,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            auto_synchronize: true,
            property_defaults: HashMap::new(),
        }
    }
}

impl LoopbackOptions {
    pub fn with_default(mut self, property: impl Into<String>, value: PropertyValue) -> Self {
        self.property_defaults.insert(property.into(), value);
        self
    }

    pub fn manual_synchronization(mut self) -> Self {
        self.auto_synchronize = false;
        self
    }
}

#[derive(Debug, Default)]
struct PlatformState {
    connected: bool,
    closed: bool,
    offline: bool,
    failing_connects: u32,
    failing_pushes: u32,
    connect_attempts: u32,
    read_delay: Option<Duration>,
    bound: HashSet<String>,
    remote_values: HashMap<(String, String), PropertyValue>,
    pushes: HashMap<String, Vec<Vec<PropertyUpdate>>>,
    events: HashMap<String, Vec<DeviceEvent>>,
}

impl PlatformState {
    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if !self.connected {
            return Err(SessionError::Transport("not connected".into()));
        }
        Ok(())
    }

    fn ensure_bound(&self, device: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        if !self.bound.contains(device) {
            return Err(SessionError::Transport(format!("{device} is not bound")));
        }
        Ok(())
    }
}

/// Remote platform living in the same process.
#[derive(Debug)]
pub struct LoopbackPlatform {
    options: LoopbackOptions,
    state: Mutex<PlatformState>,
    notifications: NotificationSender,
}

impl LoopbackPlatform {
    pub fn new(options: LoopbackOptions) -> (Arc<Self>, NotificationReceiver) {
        let (notifications, receiver) = mpsc::unbounded_channel();
        let platform = Arc::new(Self {
            options,
            state: Mutex::new(PlatformState::default()),
            notifications,
        });
        (platform, receiver)
    }

    fn notify(&self, notification: SessionNotification) -> bool {
        let device = notification.device().to_owned();
        if self.notifications.send(notification).is_err() {
            debug!(device = %device, "notification dropped, no listener");
            return false;
        }
        true
    }

    /// Take the platform off the network. Existing connections drop.
    pub fn set_offline(&self, offline: bool) {
        let mut state = self.state.lock();
        state.offline = offline;
        if offline {
            state.connected = false;
            state.bound.clear();
        }
        info!(offline, "loopback platform availability changed");
    }

    pub fn fail_next_connects(&self, attempts: u32) {
        self.state.lock().failing_connects = attempts;
    }

    /// Reject the next `batches` property pushes from bound devices.
    pub fn fail_next_pushes(&self, batches: u32) {
        self.state.lock().failing_pushes = batches;
    }

    /// Delay applied to every remote property read.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.state.lock().read_delay = delay;
    }

    /// Store a remote-authoritative value without telling the device.
    pub fn set_remote_property(&self, device: &str, property: &str, value: PropertyValue) {
        self.state
            .lock()
            .remote_values
            .insert((device.to_owned(), property.to_owned()), value);
    }

    /// Operator edit: store the value and notify the device.
    pub fn change_property(&self, device: &str, property: &str, value: PropertyValue) -> bool {
        self.set_remote_property(device, property, value.clone());
        self.notify(SessionNotification::RemotePropertyChanged {
            device: device.to_owned(),
            property: property.to_owned(),
            value,
        })
    }

    /// Acknowledge the current state of a bound device.
    pub fn synchronize(&self, device: &str) -> bool {
        if !self.state.lock().bound.contains(device) {
            warn!(device = %device, "synchronization requested for unbound device");
            return false;
        }
        self.notify(SessionNotification::PropertiesSynchronized {
            device: device.to_owned(),
        })
    }

    /// Invoke a service on a device and wait for its answer.
    pub async fn invoke_command(
        &self,
        device: &str,
        command: DeviceCommand,
    ) -> Result<CommandOutput, DeviceError> {
        let (reply, answer) = oneshot::channel();
        let sent = self.notify(SessionNotification::ServiceInvoked {
            device: device.to_owned(),
            command,
            reply,
        });
        if !sent {
            return Err(SessionError::Closed.into());
        }
        answer
            .await
            .map_err(|_| DeviceError::Session(SessionError::Closed))?
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    pub fn is_bound(&self, device: &str) -> bool {
        self.state.lock().bound.contains(device)
    }

    pub fn bound_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().bound.iter().cloned().collect();
        names.sort();
        names
    }

    /// Property batches received from `device`, oldest first.
    pub fn pushed_batches(&self, device: &str) -> Vec<Vec<PropertyUpdate>> {
        self.state
            .lock()
            .pushes
            .get(device)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_push_batches(&self) -> usize {
        self.state.lock().pushes.values().map(Vec::len).sum()
    }

    pub fn pushed_events(&self, device: &str) -> Vec<DeviceEvent> {
        self.state
            .lock()
            .events
            .get(device)
            .cloned()
            .unwrap_or_default()
    }

    /// Most recent value pushed by `device` for `property`.
    pub fn last_pushed(&self, device: &str, property: &str) -> Option<PropertyValue> {
        let state = self.state.lock();
        state.pushes.get(device)?.iter().rev().find_map(|batch| {
            batch
                .iter()
                .rev()
                .find(|update| update.name == property)
                .map(|update| update.value.clone())
        })
    }

    pub fn clear_recordings(&self) {
        let mut state = self.state.lock();
        state.pushes.clear();
        state.events.clear();
    }
}

#[async_trait]
impl Session for LoopbackPlatform {
    async fn connect(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.closed {
            return Err(SessionError::Closed);
        }
        if state.offline {
            return Err(SessionError::Transport("platform unreachable".into()));
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(SessionError::Transport("handshake rejected".into()));
        }
        state.connected = true;
        info!(attempt = state.connect_attempts, "loopback session connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let state = self.state.lock();
        state.connected && !state.closed
    }

    async fn shutdown(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.closed = true;
        state.bound.clear();
        info!("loopback session closed");
    }

    async fn bind(&self, device: &str) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock();
            state.ensure_connected()?;
            state.bound.insert(device.to_owned());
        }
        debug!(device = %device, "device bound on platform");
        if self.options.auto_synchronize {
            self.notify(SessionNotification::PropertiesSynchronized {
                device: device.to_owned(),
            });
        }
        Ok(())
    }

    async fn unbind(&self, device: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;
        state.bound.remove(device);
        Ok(())
    }

    async fn read_remote_property(
        &self,
        device: &str,
        property: &str,
        timeout: Duration,
    ) -> Result<PropertyValue, SessionError> {
        let delay = {
            let state = self.state.lock();
            state.ensure_bound(device)?;
            state.read_delay
        };
        if let Some(delay) = delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(SessionError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        state
            .remote_values
            .get(&(device.to_owned(), property.to_owned()))
            .or_else(|| self.options.property_defaults.get(property))
            .cloned()
            .ok_or_else(|| SessionError::Transport(format!("{device} has no value for {property}")))
    }

    fn push_properties(
        &self,
        device: &str,
        updates: Vec<PropertyUpdate>,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.ensure_bound(device)?;
        if state.failing_pushes > 0 {
            state.failing_pushes -= 1;
            return Err(SessionError::Transport("property batch rejected".into()));
        }
        debug!(device = %device, count = updates.len(), "properties received");
        state
            .pushes
            .entry(device.to_owned())
            .or_default()
            .push(updates);
        Ok(())
    }

    fn push_events(&self, device: &str, events: Vec<DeviceEvent>) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.ensure_bound(device)?;
        debug!(device = %device, count = events.len(), "events received");
        state
            .events
            .entry(device.to_owned())
            .or_default()
            .extend(events);
        Ok(())
    }
}
