//! ---
//! fleet_section: "04-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Session supervision and the fixed-interval scan loop."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use steamfleet_common::TimingConfig;
use steamfleet_device::{
    DeviceError, DeviceRegistry, NotificationReceiver, RegistryError, ScanReport,
    SessionNotification, SharedSession, VirtualDevice,
};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::metrics::FleetMetrics;
use crate::shutdown::{ShutdownHandle, ShutdownRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
    Stopped,
}

impl ConnectionState {
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::ShuttingDown => 3,
            ConnectionState::Stopped => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub scan_interval: Duration,
    pub reconnect_interval: Duration,
}

impl SupervisorSettings {
    pub fn from_config(timing: &TimingConfig) -> Self {
        Self {
            scan_interval: timing.scan_interval,
            reconnect_interval: timing.reconnect_interval,
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from_config(&TimingConfig::default())
    }
}

type ScanOutcome = (String, Result<ScanReport, DeviceError>);

/// Marks a device as mid-scan until the scan task ends, panics or is aborted.
struct ScanGuard {
    scanning: Arc<Mutex<HashSet<String>>>,
    device: String,
}

impl ScanGuard {
    fn acquire(scanning: &Arc<Mutex<HashSet<String>>>, device: &str) -> Option<Self> {
        if !scanning.lock().insert(device.to_owned()) {
            return None;
        }
        Some(Self {
            scanning: scanning.clone(),
            device: device.to_owned(),
        })
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.scanning.lock().remove(&self.device);
    }
}

struct SupervisorInner {
    session: SharedSession,
    registry: Arc<DeviceRegistry>,
    settings: SupervisorSettings,
    metrics: FleetMetrics,
    shutdown: ShutdownHandle,
    state: watch::Sender<ConnectionState>,
    scanning: Arc<Mutex<HashSet<String>>>,
}

impl SupervisorInner {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            self.metrics.set_connection_state(next);
            debug!(state = ?next, "connection state changed");
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn register_device(
        &self,
        device: Arc<VirtualDevice>,
    ) -> Result<Arc<VirtualDevice>, RegistryError> {
        let device = self.registry.register(device)?;
        self.metrics.set_registered_devices(self.registry.len());
        if self.session.is_connected() {
            if let Err(err) = self.session.bind(device.name()).await {
                warn!(
                    device = %device.name(),
                    error = %err,
                    "bind failed, retrying on next connect"
                );
            }
        }
        Ok(device)
    }

    async fn unregister_device(&self, name: &str) -> Option<Arc<VirtualDevice>> {
        let removed = self.registry.unregister(name)?;
        self.metrics.set_registered_devices(self.registry.len());
        if self.session.is_connected() {
            if let Err(err) = self.session.unbind(name).await {
                warn!(device = %name, error = %err, "unbind failed");
            }
        }
        Some(removed)
    }

    async fn bind_all(&self) {
        for device in self.registry.snapshot() {
            if let Err(err) = self.session.bind(device.name()).await {
                warn!(device = %device.name(), error = %err, "bind failed");
            }
        }
    }

    /// Returns true when the fleet should be scanned on this tick.
    async fn on_tick(&self, next_connect_at: &mut Instant) -> bool {
        if self.session.is_connected() {
            self.set_state(ConnectionState::Connected);
            return true;
        }

        if self.current_state() == ConnectionState::Connected {
            warn!("session lost, devices wait for resynchronization");
            self.registry.for_each(|device| device.mark_unsynchronized());
        }
        self.set_state(ConnectionState::Disconnected);
        let now = Instant::now();
        if now < *next_connect_at {
            return false;
        }

        self.set_state(ConnectionState::Connecting);
        self.metrics.record_connect_attempt();
        match self.session.connect().await {
            Ok(()) => {
                info!(devices = self.registry.len(), "session connected");
                self.set_state(ConnectionState::Connected);
                self.bind_all().await;
            }
            Err(err) => {
                *next_connect_at = Instant::now() + self.settings.reconnect_interval;
                warn!(
                    error = %err,
                    retry_in = ?self.settings.reconnect_interval,
                    "connect failed"
                );
                self.set_state(ConnectionState::Disconnected);
            }
        }
        false
    }

    /// Starts one scan task per registered device. A device whose previous
    /// scan is still waiting on the platform is skipped this round.
    fn scan_all(&self, scans: &mut JoinSet<ScanOutcome>) {
        for device in self.registry.snapshot() {
            let Some(guard) = ScanGuard::acquire(&self.scanning, device.name()) else {
                debug!(device = %device.name(), "previous scan still running, skipped");
                continue;
            };
            scans.spawn(async move {
                let _guard = guard;
                let result = device.scan_step().await;
                (device.name().to_owned(), result)
            });
        }
    }

    fn record_scan(&self, joined: Result<ScanOutcome, JoinError>) {
        match joined {
            Ok((_, Ok(report))) => self.metrics.record_scan(&report),
            Ok((device, Err(err))) => {
                self.metrics.record_scan_failure();
                warn!(device = %device, error = %err, "scan step failed");
            }
            Err(err) => {
                self.metrics.record_scan_failure();
                warn!(error = %err, "scan task failed");
            }
        }
    }

    fn handle_notification(&self, notification: SessionNotification) {
        match notification {
            SessionNotification::PropertiesSynchronized { device } => {
                match self.registry.get(&device) {
                    Some(device) => device.on_synchronized(),
                    None => debug!(device = %device, "synchronization for unknown device"),
                }
            }
            SessionNotification::RemotePropertyChanged {
                device,
                property,
                value,
            } => match self.registry.get(&device) {
                Some(target) => {
                    if let Err(err) = target.apply_remote_property(&property, value) {
                        warn!(
                            device = %device,
                            property = %property,
                            error = %err,
                            "remote property change rejected"
                        );
                    }
                }
                None => debug!(device = %device, "property change for unknown device"),
            },
            SessionNotification::ServiceInvoked {
                device,
                command,
                reply,
            } => {
                let result = match self.registry.get(&device) {
                    Some(target) => target.invoke(command),
                    None => Err(DeviceError::precondition(&device, "device is not registered")),
                };
                if reply.send(result).is_err() {
                    debug!(device = %device, "service caller went away before the reply");
                }
            }
        }
    }

    async fn stop(&self) {
        self.set_state(ConnectionState::ShuttingDown);
        info!("closing session");
        self.session.shutdown().await;
        self.set_state(ConnectionState::Stopped);
        info!("supervisor stopped");
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_loop(inner: Arc<SupervisorInner>, mut notifications: NotificationReceiver) {
    let mut shutdown = inner.shutdown.subscribe();
    let mut ticker = interval(inner.settings.scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut next_connect_at = Instant::now();
    let mut listening = true;
    let mut scans = JoinSet::new();

    info!(
        scan_interval = ?inner.settings.scan_interval,
        reconnect_interval = ?inner.settings.reconnect_interval,
        "supervisor loop started"
    );

    loop {
        let deadline = match *shutdown.borrow_and_update() {
            ShutdownRequest::Now => break,
            ShutdownRequest::At(deadline) if deadline <= Instant::now() => break,
            ShutdownRequest::At(deadline) => Some(deadline),
            ShutdownRequest::None => None,
        };

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = wait_for(deadline) => {}
            notification = notifications.recv(), if listening => {
                match notification {
                    Some(notification) => inner.handle_notification(notification),
                    None => {
                        warn!("notification channel closed");
                        listening = false;
                    }
                }
            }
            Some(joined) = scans.join_next(), if !scans.is_empty() => {
                inner.record_scan(joined);
            }
            _ = ticker.tick() => {
                if inner.on_tick(&mut next_connect_at).await {
                    inner.scan_all(&mut scans);
                }
            }
        }
    }

    if !scans.is_empty() {
        debug!(running = scans.len(), "aborting scans in flight");
    }
    scans.shutdown().await;
    inner.stop().await;
}

/// Owns the session to the remote platform and drives the scan loop.
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ConnectionSupervisor {
    pub fn new(
        session: SharedSession,
        registry: Arc<DeviceRegistry>,
        settings: SupervisorSettings,
        metrics: FleetMetrics,
    ) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Disconnected);
        metrics.set_connection_state(ConnectionState::Disconnected);
        metrics.set_registered_devices(registry.len());
        Self {
            inner: Arc::new(SupervisorInner {
                session,
                registry,
                settings,
                metrics,
                shutdown: ShutdownHandle::new(),
                state,
                scanning: Arc::new(Mutex::new(HashSet::new())),
            }),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.inner.shutdown.clone()
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.inner.registry.clone()
    }

    pub fn metrics(&self) -> FleetMetrics {
        self.inner.metrics.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.current_state()
    }

    /// Registers a device, binding it right away when the session is up.
    pub async fn register_device(
        &self,
        device: Arc<VirtualDevice>,
    ) -> Result<Arc<VirtualDevice>, RegistryError> {
        self.inner.register_device(device).await
    }

    /// Runs the loop on the current task until shutdown.
    pub async fn run(self, notifications: NotificationReceiver) {
        run_loop(self.inner, notifications).await;
    }

    pub fn spawn(self, notifications: NotificationReceiver) -> SupervisorHandle {
        let inner = self.inner.clone();
        let task = tokio::spawn(run_loop(self.inner, notifications));
        SupervisorHandle { inner, task }
    }
}

/// Handle to a supervisor running on its own task.
pub struct SupervisorHandle {
    inner: Arc<SupervisorInner>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn state(&self) -> ConnectionState {
        self.inner.current_state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.inner.shutdown.clone()
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.inner.registry.clone()
    }

    pub fn metrics(&self) -> FleetMetrics {
        self.inner.metrics.clone()
    }

    pub async fn register_device(
        &self,
        device: Arc<VirtualDevice>,
    ) -> Result<Arc<VirtualDevice>, RegistryError> {
        self.inner.register_device(device).await
    }

    pub async fn unregister_device(&self, name: &str) -> Option<Arc<VirtualDevice>> {
        self.inner.unregister_device(name).await
    }

    /// Waits until the loop reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        rx.wait_for(|current| *current == state)
            .await
            .context("supervisor state channel closed")?;
        Ok(())
    }

    /// Waits for the loop to exit on its own.
    pub async fn join(self) -> Result<()> {
        self.task.await.context("supervisor task failed")
    }

    pub async fn shutdown(self) -> Result<()> {
        self.inner.shutdown.request_now();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::new_registry;
    use steamfleet_device::{names, DeviceCommand, PropertyValue, Session};
    use steamfleet_remote::{LoopbackOptions, LoopbackPlatform};
    use steamfleet_sim::ScriptedSignals;

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            scan_interval: Duration::from_secs(3),
            reconnect_interval: Duration::from_secs(15),
        }
    }

    fn sensor(platform: &Arc<LoopbackPlatform>, name: &str) -> Arc<VirtualDevice> {
        Arc::new(
            VirtualDevice::builder(name, platform.clone())
                .signals(ScriptedSignals::new().temperatures([410.0, 420.0]))
                .build()
                .unwrap(),
        )
    }

    fn supervisor(platform: &Arc<LoopbackPlatform>) -> ConnectionSupervisor {
        ConnectionSupervisor::new(
            platform.clone(),
            Arc::new(DeviceRegistry::new()),
            settings(),
            FleetMetrics::new(new_registry()).unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn connects_binds_and_scans() {
        let (platform, notifications) = LoopbackPlatform::new(LoopbackOptions::default());
        let supervisor = supervisor(&platform);
        supervisor
            .register_device(sensor(&platform, "SteamSensor"))
            .await
            .unwrap();
        let handle = supervisor.spawn(notifications);

        handle.wait_for_state(ConnectionState::Connected).await.unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(platform.is_bound("SteamSensor"));
        assert_eq!(platform.pushed_batches("SteamSensor")[0].len(), 7);
        assert!(handle.metrics().scans() >= 2);
        handle.shutdown().await.unwrap();
        assert!(!platform.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_retry_after_reconnect_interval() {
        let (platform, notifications) = LoopbackPlatform::new(LoopbackOptions::default());
        platform.fail_next_connects(2);
        let handle = supervisor(&platform).spawn(notifications);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(platform.connect_attempts(), 1);
        assert_eq!(handle.state(), ConnectionState::Disconnected);

        // Scans at 3s..12s do not retry before the interval has passed.
        tokio::time::sleep(Duration::from_secs(13)).await;
        assert_eq!(platform.connect_attempts(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(platform.connect_attempts(), 2);

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(platform.connect_attempts(), 3);
        assert_eq!(handle.state(), ConnectionState::Connected);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn device_registered_while_connected_is_bound_immediately() {
        let (platform, notifications) = LoopbackPlatform::new(LoopbackOptions::default());
        let handle = supervisor(&platform).spawn(notifications);
        handle.wait_for_state(ConnectionState::Connected).await.unwrap();

        handle
            .register_device(sensor(&platform, "Late"))
            .await
            .unwrap();
        assert!(platform.is_bound("Late"));
        let err = handle
            .register_device(sensor(&platform, "Late"))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("Late".into()));

        assert!(handle.unregister_device("Late").await.is_some());
        assert!(!platform.is_bound("Late"));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn scan_errors_are_isolated_per_device() {
        let (platform, notifications) = LoopbackPlatform::new(LoopbackOptions::default());
        let supervisor = supervisor(&platform);
        let broken = Arc::new(
            VirtualDevice::builder("Broken", platform.clone())
                .build()
                .unwrap(),
        );
        supervisor.register_device(broken).await.unwrap();
        supervisor
            .register_device(sensor(&platform, "Healthy"))
            .await
            .unwrap();
        let handle = supervisor.spawn(notifications);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(handle.metrics().scan_failures() >= 2);
        assert!(!platform.pushed_batches("Healthy").is_empty());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_settings_read_does_not_hold_back_other_devices() {
        let options =
            LoopbackOptions::default().with_default(names::TEMPERATURE_LIMIT, 430.0.into());
        let (platform, notifications) = LoopbackPlatform::new(options);
        platform.set_read_delay(Some(Duration::from_secs(20)));
        let supervisor = supervisor(&platform);
        let healthy = sensor(&platform, "Healthy");
        healthy
            .apply_remote_property(names::TEMPERATURE_LIMIT, PropertyValue::Number(150.0))
            .unwrap();
        supervisor.register_device(healthy).await.unwrap();
        let slow = supervisor
            .register_device(sensor(&platform, "Slow"))
            .await
            .unwrap();
        let handle = supervisor.spawn(notifications);

        // Slow waits on its settings read from 3s until the 10s timeout.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(platform.pushed_batches("Healthy").len(), 1);
        assert!(platform.pushed_batches("Slow").is_empty());
        assert_eq!(handle.metrics().scans(), 3);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(platform.pushed_batches("Slow").len(), 1);
        assert!(!slow.initial_settings_fetched());
        assert_eq!(handle.metrics().scans(), 5);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_push_is_resent_in_full() {
        let options =
            LoopbackOptions::default().with_default(names::TEMPERATURE_LIMIT, 150.0.into());
        let (platform, notifications) = LoopbackPlatform::new(options);
        platform.fail_next_pushes(1);
        let supervisor = supervisor(&platform);
        supervisor
            .register_device(sensor(&platform, "SteamSensor"))
            .await
            .unwrap();
        let handle = supervisor.spawn(notifications);

        // The 3s push is rejected; the property throttle opens again at 18s.
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(platform.pushed_batches("SteamSensor").is_empty());
        assert_eq!(handle.metrics().push_failures(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let batches = platform.pushed_batches("SteamSensor");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 7);
        assert_eq!(
            platform.last_pushed("SteamSensor", names::TEMPERATURE_LIMIT),
            Some(PropertyValue::Number(150.0))
        );
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn remote_changes_and_commands_reach_devices() {
        let (platform, notifications) = LoopbackPlatform::new(LoopbackOptions::default());
        let supervisor = supervisor(&platform);
        let device = supervisor
            .register_device(sensor(&platform, "SteamSensor"))
            .await
            .unwrap();
        let handle = supervisor.spawn(notifications);
        handle.wait_for_state(ConnectionState::Connected).await.unwrap();

        platform.change_property("SteamSensor", names::TEMPERATURE_LIMIT, 150.0.into());
        let sum = platform
            .invoke_command("SteamSensor", DeviceCommand::AddNumbers { a: 1.0, b: 2.0 })
            .await
            .unwrap();
        assert_eq!(sum, steamfleet_device::CommandOutput::Number(3.0));
        assert_eq!(
            device.property(names::TEMPERATURE_LIMIT),
            Some(PropertyValue::Number(150.0))
        );

        let missing = platform
            .invoke_command("Nobody", DeviceCommand::GetBigString)
            .await;
        assert!(matches!(missing, Err(DeviceError::Precondition { .. })));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_command_stops_loop_after_delay() {
        let (platform, notifications) = LoopbackPlatform::new(LoopbackOptions::default());
        let supervisor = supervisor(&platform);
        let shutdown = Arc::new(supervisor.shutdown_handle());
        let device = Arc::new(
            VirtualDevice::builder("SteamSensor", platform.clone())
                .signals(ScriptedSignals::new())
                .shutdown_requester(shutdown)
                .build()
                .unwrap(),
        );
        supervisor.register_device(device).await.unwrap();
        let handle = supervisor.spawn(notifications);
        handle.wait_for_state(ConnectionState::Connected).await.unwrap();

        let started = Instant::now();
        platform
            .invoke_command("SteamSensor", DeviceCommand::Shutdown)
            .await
            .unwrap();
        assert!(platform.is_connected());

        handle.wait_for_state(ConnectionState::Stopped).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(!platform.is_connected());
        handle.join().await.unwrap();
    }
}
