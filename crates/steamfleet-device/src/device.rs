//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Virtual steam sensor: sync gating, scan step and throttled pushes."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use steamfleet_common::{LogControl, SharedClock, SimulationConfig, SystemClock, TimingConfig};
use steamfleet_sim::{Route, SignalSource};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::command::{self, CommandOutput, DeviceCommand, ShutdownRequester};
use crate::error::{DeviceError, SessionError};
use crate::event::{DeviceEvent, EventQueue};
use crate::schema::{names, ThingShape, STEAM_SENSOR};
use crate::session::SharedSession;
use crate::store::{PropertyStore, PropertyUpdate};
use crate::throttle::PushThrottle;
use crate::value::{BaseType, PropertyValue};

const NO_SIGNAL_SOURCE: &str = "no signal source configured";

/// Timing knobs a device needs from the application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub property_push_interval: Duration,
    pub event_push_interval: Duration,
    pub remote_read_timeout: Duration,
    pub shutdown_delay: Duration,
    pub inlet_valve_closed_every_secs: u32,
}

impl DeviceSettings {
    pub fn from_config(timing: &TimingConfig, simulation: &SimulationConfig) -> Self {
        Self {
            property_push_interval: timing.property_push_interval,
            event_push_interval: timing.event_push_interval,
            remote_read_timeout: timing.remote_read_timeout,
            shutdown_delay: timing.shutdown_delay,
            inlet_valve_closed_every_secs: simulation.inlet_valve_closed_every_secs,
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self::from_config(&TimingConfig::default(), &SimulationConfig::default())
    }
}

/// Bind/synchronisation state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    Unbound,
    BoundUnsynced,
    Synced,
}

/// Outcome of one scan step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// `false` when the step was gated because the device is not synchronized.
    pub executed: bool,
    pub fault_raised: bool,
    pub properties_pushed: usize,
    pub events_pushed: usize,
    pub push_failed: bool,
}

/// Point-in-time view of a device, used by tests and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub name: String,
    pub state: SyncState,
    pub initial_settings_fetched: bool,
    pub scan_counter: u32,
    pub route_index: usize,
    pub total_flow: f64,
    pub pending_events: usize,
    pub properties: Vec<PropertyUpdate>,
}

#[derive(Default)]
struct Outbound {
    properties: Vec<PropertyUpdate>,
    events: Vec<DeviceEvent>,
}

struct DeviceState {
    bound: bool,
    synchronized: bool,
    initial_settings_fetched: bool,
    scan_counter: u32,
    route_index: usize,
    total_flow: f64,
    properties: PropertyStore,
    events: EventQueue,
    property_throttle: PushThrottle,
    event_throttle: PushThrottle,
    signals: Option<Box<dyn SignalSource>>,
}

impl DeviceState {
    fn sync_state(&self) -> SyncState {
        match (self.bound, self.synchronized) {
            (false, _) => SyncState::Unbound,
            (true, false) => SyncState::BoundUnsynced,
            (true, true) => SyncState::Synced,
        }
    }

    /// Mutates the simulated signals for one scan. Returns whether a fault was raised.
    fn advance(
        &mut self,
        device: &str,
        route: &Route,
        settings: &DeviceSettings,
        now: DateTime<Utc>,
    ) -> Result<bool, DeviceError> {
        let signals = self
            .signals
            .as_mut()
            .ok_or_else(|| DeviceError::precondition(device, NO_SIGNAL_SOURCE))?;

        self.scan_counter += 1;
        let scan = self.scan_counter;

        let temperature =
            signals.next_temperature(self.properties.number(names::TEMPERATURE)?, scan);
        let limit = self.properties.number(names::TEMPERATURE_LIMIT)?;
        let faulted = limit > 0.0 && temperature > limit;
        let previously_faulted = self.properties.boolean(names::FAULT_STATUS)?;
        self.properties.set(names::TEMPERATURE, temperature.into(), now)?;
        let raised = faulted && !previously_faulted;
        if raised {
            self.events.push(DeviceEvent::fault(temperature, limit, now));
        }
        self.properties.set(names::FAULT_STATUS, faulted.into(), now)?;
        self.route_index = route.next_index(self.route_index);
        self.properties.set(names::LOCATION, route.waypoint(self.route_index).into(), now)?;

        if scan % 2 == 0 {
            let pressure = signals.next_pressure(self.properties.number(names::PRESSURE)?, scan);
            self.properties.set(names::PRESSURE, pressure.into(), now)?;
        }

        if scan % 3 == 0 {
            self.total_flow += signals.flow_increment(scan).max(0.0);
            self.properties.set(names::TOTAL_FLOW, self.total_flow.into(), now)?;
            let closed_every = settings.inlet_valve_closed_every_secs.max(1);
            let inlet_open = now.second() % closed_every != 0;
            self.properties.set(names::INLET_VALVE, inlet_open.into(), now)?;
            self.scan_counter = 0;
        }

        Ok(raised)
    }

    fn collect_outbound(&mut self, now: Instant) -> Outbound {
        let mut outbound = Outbound::default();
        if self.properties.has_dirty() && self.property_throttle.ready(now) {
            outbound.properties = self.properties.take_dirty();
            self.property_throttle.mark(now);
        }
        if !self.events.is_empty() && self.event_throttle.ready(now) {
            outbound.events = self.events.drain();
            self.event_throttle.mark(now);
        }
        outbound
    }
}

/// In-process simulated steam sensor mirrored to the remote platform.
///
/// All mutable state sits behind one lock, so a remote property write and a
/// scan step never interleave.
pub struct VirtualDevice {
    name: String,
    description: String,
    identifier: Option<String>,
    shape: &'static ThingShape,
    route: Route,
    settings: DeviceSettings,
    session: SharedSession,
    clock: SharedClock,
    log_control: LogControl,
    shutdown: Option<Arc<dyn ShutdownRequester>>,
    state: Mutex<DeviceState>,
}

impl fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl VirtualDevice {
    pub fn builder(name: impl Into<String>, session: SharedSession) -> VirtualDeviceBuilder {
        VirtualDeviceBuilder::new(name, session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn shape(&self) -> &'static ThingShape {
        self.shape
    }

    pub fn state(&self) -> SyncState {
        self.state.lock().sync_state()
    }

    pub fn is_synchronized(&self) -> bool {
        self.state.lock().synchronized
    }

    pub fn initial_settings_fetched(&self) -> bool {
        self.state.lock().initial_settings_fetched
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.state.lock().properties.get(name).cloned()
    }

    pub fn pending_events(&self) -> Vec<DeviceEvent> {
        self.state.lock().events.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        let state = self.state.lock();
        DeviceSnapshot {
            name: self.name.clone(),
            state: state.sync_state(),
            initial_settings_fetched: state.initial_settings_fetched,
            scan_counter: state.scan_counter,
            route_index: state.route_index,
            total_flow: state.total_flow,
            pending_events: state.events.len(),
            properties: state.properties.snapshot(),
        }
    }

    pub(crate) fn mark_bound(&self) {
        let mut state = self.state.lock();
        if !state.bound {
            state.bound = true;
            debug!(device = %self.name, "device bound");
        }
    }

    pub(crate) fn mark_unbound(&self) {
        let mut state = self.state.lock();
        state.bound = false;
        state.synchronized = false;
        debug!(device = %self.name, "device unbound");
    }

    /// The session to the platform was lost. Pushes wait for the next acknowledgement.
    pub fn mark_unsynchronized(&self) {
        let mut state = self.state.lock();
        if state.synchronized {
            state.synchronized = false;
            debug!(device = %self.name, "device awaiting resynchronization");
        }
    }

    /// The remote side acknowledged the bound state.
    ///
    /// Every property is scheduled for the next scan's push and the property
    /// throttle is reset, so repeated calls schedule the same single full push.
    pub fn on_synchronized(&self) {
        let mut state = self.state.lock();
        if !state.bound {
            warn!(device = %self.name, "synchronization for an unbound device ignored");
            return;
        }
        let first = !state.synchronized;
        state.synchronized = true;
        state.properties.mark_all_dirty();
        state.property_throttle.reset();
        info!(device = %self.name, first, "device synchronized, full property push scheduled");
    }

    /// Runs one scan cycle.
    ///
    /// Until the remote TemperatureLimit has been read once, the read comes
    /// first, bounded by `remote_read_timeout`; when it fails the scan goes on
    /// with the locally stored limit. Fails only with
    /// [`DeviceError::Precondition`] for a device built without a signal
    /// source. Push failures are logged and reported in the returned
    /// [`ScanReport`].
    pub async fn scan_step(&self) -> Result<ScanReport, DeviceError> {
        let fetch = {
            let state = self.state.lock();
            if state.signals.is_none() {
                return Err(DeviceError::precondition(&self.name, NO_SIGNAL_SOURCE));
            }
            if !state.synchronized {
                trace!(device = %self.name, "scan skipped until synchronized");
                return Ok(ScanReport::default());
            }
            !state.initial_settings_fetched
        };

        if fetch {
            match self.fetch_initial_settings().await {
                Ok(limit) => info!(device = %self.name, limit, "initial settings fetched"),
                Err(err) => info!(
                    device = %self.name,
                    error = %err,
                    "initial settings unavailable, scanning with the local limit"
                ),
            }
        }

        let now = self.clock.now();
        let (outbound, mut report) = {
            let mut state = self.state.lock();
            if !state.synchronized {
                debug!(device = %self.name, "synchronization lost while reading settings");
                return Ok(ScanReport::default());
            }

            let fault_raised = state.advance(&self.name, &self.route, &self.settings, now)?;
            if fault_raised {
                info!(device = %self.name, "fault raised");
            }

            let report = ScanReport {
                executed: true,
                fault_raised,
                ..ScanReport::default()
            };
            (state.collect_outbound(Instant::now()), report)
        };

        self.deliver(outbound, &mut report);
        Ok(report)
    }

    fn deliver(&self, outbound: Outbound, report: &mut ScanReport) {
        if !outbound.properties.is_empty() {
            let count = outbound.properties.len();
            let pushed: Vec<String> = outbound
                .properties
                .iter()
                .map(|update| update.name.clone())
                .collect();
            match self.session.push_properties(&self.name, outbound.properties) {
                Ok(()) => report.properties_pushed = count,
                Err(err) => {
                    report.push_failed = true;
                    warn!(
                        device = %self.name,
                        error = %err,
                        "property push failed, values rescheduled"
                    );
                    self.state
                        .lock()
                        .properties
                        .mark_dirty(pushed.iter().map(String::as_str));
                }
            }
        }
        if !outbound.events.is_empty() {
            let count = outbound.events.len();
            match self.session.push_events(&self.name, outbound.events) {
                Ok(()) => report.events_pushed = count,
                Err(err) => {
                    report.push_failed = true;
                    warn!(device = %self.name, error = %err, "event push failed");
                }
            }
        }
    }

    /// Reads the remote-authoritative temperature limit once.
    ///
    /// After the first success, or once the operator has written the limit,
    /// the stored value is kept and returned as is.
    pub async fn fetch_initial_settings(&self) -> Result<f64, DeviceError> {
        let limit_timeout = self.settings.remote_read_timeout;
        let read = self.session.read_remote_property(
            &self.name,
            names::TEMPERATURE_LIMIT,
            limit_timeout,
        );
        let value = tokio::time::timeout(limit_timeout, read)
            .await
            .map_err(|_| SessionError::Timeout(limit_timeout))??;
        if value.base_type() != BaseType::Number {
            return Err(DeviceError::TypeMismatch {
                property: names::TEMPERATURE_LIMIT.to_owned(),
                expected: BaseType::Number,
                actual: value.base_type(),
            });
        }

        let mut state = self.state.lock();
        if !state.initial_settings_fetched {
            state
                .properties
                .apply_remote(names::TEMPERATURE_LIMIT, value, self.clock.now())?;
            state.initial_settings_fetched = true;
        }
        state.properties.number(names::TEMPERATURE_LIMIT)
    }

    /// Applies a property change made on the remote side.
    pub fn apply_remote_property(
        &self,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), DeviceError> {
        let definition =
            self.shape
                .property(property)
                .ok_or_else(|| DeviceError::UnknownProperty {
                    device: self.name.clone(),
                    property: property.to_owned(),
                })?;
        if definition.read_only {
            return Err(DeviceError::ReadOnlyProperty {
                property: property.to_owned(),
            });
        }

        {
            let mut state = self.state.lock();
            state
                .properties
                .apply_remote(property, value.clone(), self.clock.now())?;
            if property == names::TEMPERATURE_LIMIT {
                state.initial_settings_fetched = true;
            }
        }

        if property == names::TEMPERATURE_LIMIT {
            info!(
                device = %self.name,
                "Temperature limit on {} has been changed to {}°",
                self.name,
                value
            );
        } else {
            debug!(device = %self.name, property, value = %value, "remote property applied");
        }
        Ok(())
    }

    pub fn invoke(&self, command: DeviceCommand) -> Result<CommandOutput, DeviceError> {
        debug!(device = %self.name, command = command.name(), "service invoked");
        match command {
            DeviceCommand::GetReadings => Ok(CommandOutput::Readings(command::demo_readings(
                self.clock.now(),
            ))),
            DeviceCommand::AddNumbers { a, b } => Ok(CommandOutput::Number(a + b)),
            DeviceCommand::GetBigString => Ok(CommandOutput::Text(command::big_string())),
            DeviceCommand::StartLogging => {
                if self.log_control.enable() {
                    info!(device = %self.name, "file logging started");
                }
                Ok(CommandOutput::Nothing)
            }
            DeviceCommand::StopLogging => {
                if self.log_control.disable() {
                    info!(device = %self.name, "file logging stopped");
                }
                Ok(CommandOutput::Nothing)
            }
            DeviceCommand::Shutdown => {
                let requester = self.shutdown.as_ref().ok_or_else(|| {
                    DeviceError::precondition(&self.name, "shutdown is not supported")
                })?;
                let delay = self.settings.shutdown_delay;
                if requester.request_shutdown(delay) {
                    info!(device = %self.name, delay = ?delay, "shutdown requested");
                } else {
                    debug!(device = %self.name, "shutdown already pending");
                }
                Ok(CommandOutput::Nothing)
            }
        }
    }
}

pub struct VirtualDeviceBuilder {
    name: String,
    description: Option<String>,
    identifier: Option<String>,
    shape: &'static ThingShape,
    route: Route,
    settings: DeviceSettings,
    session: SharedSession,
    clock: Option<SharedClock>,
    log_control: Option<LogControl>,
    shutdown: Option<Arc<dyn ShutdownRequester>>,
    signals: Option<Box<dyn SignalSource>>,
}

impl VirtualDeviceBuilder {
    fn new(name: impl Into<String>, session: SharedSession) -> Self {
        Self {
            name: name.into(),
            description: None,
            identifier: None,
            shape: &STEAM_SENSOR,
            route: Route::steam_loop(),
            settings: DeviceSettings::default(),
            session,
            clock: None,
            log_control: None,
            shutdown: None,
            signals: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn shape(mut self, shape: &'static ThingShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    pub fn settings(mut self, settings: DeviceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn log_control(mut self, log_control: LogControl) -> Self {
        self.log_control = Some(log_control);
        self
    }

    pub fn shutdown_requester(mut self, requester: Arc<dyn ShutdownRequester>) -> Self {
        self.shutdown = Some(requester);
        self
    }

    pub fn signals(mut self, signals: impl SignalSource + 'static) -> Self {
        self.signals = Some(Box::new(signals));
        self
    }

    pub fn build(self) -> Result<VirtualDevice, DeviceError> {
        if self.name.trim().is_empty() {
            return Err(DeviceError::precondition(
                self.name,
                "device name must not be empty",
            ));
        }
        self.shape.validate()?;

        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let now = clock.now();
        let state = DeviceState {
            bound: false,
            synchronized: false,
            initial_settings_fetched: false,
            scan_counter: 0,
            route_index: 0,
            total_flow: 0.0,
            properties: PropertyStore::new(&self.name, self.shape, self.route.first(), now),
            events: EventQueue::default(),
            property_throttle: PushThrottle::new(self.settings.property_push_interval),
            event_throttle: PushThrottle::new(self.settings.event_push_interval),
            signals: self.signals,
        };

        Ok(VirtualDevice {
            description: self.description.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            identifier: self.identifier,
            shape: self.shape,
            route: self.route,
            settings: self.settings,
            session: self.session,
            clock,
            log_control: self.log_control.unwrap_or_default(),
            shutdown: self.shutdown,
            state: Mutex::new(state),
        })
    }
}
