//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Name-keyed registry of bound virtual devices."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::device::VirtualDevice;
use crate::error::RegistryError;

/// Devices keyed by name. Iteration always runs over a snapshot, so
/// registration during a scan pass never disturbs the pass.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Arc<VirtualDevice>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a device and moves it to the bound state.
    pub fn register(
        &self,
        device: Arc<VirtualDevice>,
    ) -> Result<Arc<VirtualDevice>, RegistryError> {
        let mut devices = self.devices.write();
        if devices.contains_key(device.name()) {
            return Err(RegistryError::DuplicateName(device.name().to_owned()));
        }
        device.mark_bound();
        devices.insert(device.name().to_owned(), device.clone());
        info!(device = %device.name(), total = devices.len(), "device registered");
        Ok(device)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<VirtualDevice>> {
        let removed = self.devices.write().remove(name);
        if let Some(device) = &removed {
            device.mark_unbound();
            info!(device = %name, "device unregistered");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<VirtualDevice>> {
        self.devices.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Current devices sorted by name. The lock is released before returning.
    pub fn snapshot(&self) -> Vec<Arc<VirtualDevice>> {
        let mut devices: Vec<Arc<VirtualDevice>> = self.devices.read().values().cloned().collect();
        devices.sort_by(|a, b| a.name().cmp(b.name()));
        devices
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<VirtualDevice>),
    {
        for device in self.snapshot() {
            f(&device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SyncState;
    use crate::error::SessionError;
    use crate::event::DeviceEvent;
    use crate::session::{Session, SharedSession};
    use crate::store::PropertyUpdate;
    use crate::value::PropertyValue;
    use async_trait::async_trait;
    use std::time::Duration;
    use steamfleet_sim::ScriptedSignals;

    struct NullSession;

    #[async_trait]
    impl Session for NullSession {
        async fn connect(&self) -> Result<(), SessionError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn shutdown(&self) {}
        async fn bind(&self, _device: &str) -> Result<(), SessionError> {
            Ok(())
        }
        async fn unbind(&self, _device: &str) -> Result<(), SessionError> {
            Ok(())
        }
        async fn read_remote_property(
            &self,
            _device: &str,
            _property: &str,
            timeout: Duration,
        ) -> Result<PropertyValue, SessionError> {
            Err(SessionError::Timeout(timeout))
        }
        fn push_properties(&self, _: &str, _: Vec<PropertyUpdate>) -> Result<(), SessionError> {
            Ok(())
        }
        fn push_events(&self, _: &str, _: Vec<DeviceEvent>) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn device(name: &str) -> Arc<VirtualDevice> {
        let session: SharedSession = Arc::new(NullSession);
        Arc::new(
            VirtualDevice::builder(name, session)
                .signals(ScriptedSignals::new())
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_and_first_device_survives() {
        let registry = DeviceRegistry::new();
        let first = registry.register(device("SteamSensor1")).unwrap();
        let err = registry.register(device("SteamSensor1")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("SteamSensor1".into()));
        assert_eq!(registry.len(), 1);

        let kept = registry.get("SteamSensor1").unwrap();
        assert!(Arc::ptr_eq(&first, &kept));
        kept.on_synchronized();
        assert!(kept.scan_step().await.unwrap().executed);
    }

    #[test]
    fn admission_binds_and_removal_unbinds() {
        let registry = DeviceRegistry::new();
        let sensor = device("SteamSensor");
        assert_eq!(sensor.state(), SyncState::Unbound);
        registry.register(sensor.clone()).unwrap();
        assert_eq!(sensor.state(), SyncState::BoundUnsynced);
        sensor.on_synchronized();
        assert_eq!(sensor.state(), SyncState::Synced);
        registry.unregister("SteamSensor").unwrap();
        assert_eq!(sensor.state(), SyncState::Unbound);
        assert!(registry.unregister("SteamSensor").is_none());
    }

    #[test]
    fn iteration_uses_a_snapshot() {
        let registry = DeviceRegistry::new();
        registry.register(device("A")).unwrap();
        registry.register(device("B")).unwrap();
        let mut visited = Vec::new();
        registry.for_each(|device| {
            visited.push(device.name().to_owned());
            registry.unregister(device.name());
            let _ = registry.register(device_named_late(device.name()));
        });
        assert_eq!(visited, vec!["A", "B"]);
        assert_eq!(registry.names(), vec!["A-late", "B-late"]);
    }

    fn device_named_late(name: &str) -> Arc<VirtualDevice> {
        device(&format!("{name}-late"))
    }
}
