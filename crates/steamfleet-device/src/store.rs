//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Typed property store with change tracking."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use steamfleet_sim::GeoPoint;

use crate::error::DeviceError;
use crate::schema::ThingShape;
use crate::value::PropertyValue;

/// One property value as sent to the remote platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyUpdate {
    pub name: String,
    pub value: PropertyValue,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PropertyEntry {
    value: PropertyValue,
    changed_at: DateTime<Utc>,
    dirty: bool,
}

/// Property values of a single device keyed by name, in declaration order.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    device: String,
    shape: &'static ThingShape,
    entries: IndexMap<&'static str, PropertyEntry>,
}

impl PropertyStore {
    pub fn new(
        device: impl Into<String>,
        shape: &'static ThingShape,
        origin: GeoPoint,
        now: DateTime<Utc>,
    ) -> Self {
        let entries = shape
            .properties
            .iter()
            .map(|definition| {
                (
                    definition.name,
                    PropertyEntry {
                        value: PropertyValue::initial(definition.base_type, now, origin),
                        changed_at: now,
                        dirty: false,
                    },
                )
            })
            .collect();
        Self {
            device: device.into(),
            shape,
            entries,
        }
    }

    /// Local write. Marks the property for the next push when the value changed.
    pub fn set(
        &mut self,
        name: &str,
        value: PropertyValue,
        now: DateTime<Utc>,
    ) -> Result<(), DeviceError> {
        let entry = self.checked_entry(name, &value)?;
        if entry.value != value {
            entry.value = value;
            entry.changed_at = now;
            entry.dirty = true;
        }
        Ok(())
    }

    /// Write originating from the remote side; never scheduled for a push back.
    pub fn apply_remote(
        &mut self,
        name: &str,
        value: PropertyValue,
        now: DateTime<Utc>,
    ) -> Result<(), DeviceError> {
        let entry = self.checked_entry(name, &value)?;
        entry.value = value;
        entry.changed_at = now;
        entry.dirty = false;
        Ok(())
    }

    fn checked_entry(
        &mut self,
        name: &str,
        value: &PropertyValue,
    ) -> Result<&mut PropertyEntry, DeviceError> {
        let definition = self
            .shape
            .property(name)
            .ok_or_else(|| DeviceError::UnknownProperty {
                device: self.device.clone(),
                property: name.to_owned(),
            })?;
        if definition.base_type != value.base_type() {
            return Err(DeviceError::TypeMismatch {
                property: name.to_owned(),
                expected: definition.base_type,
                actual: value.base_type(),
            });
        }
        self.entries
            .get_mut(definition.name)
            .ok_or_else(|| DeviceError::UnknownProperty {
                device: self.device.clone(),
                property: name.to_owned(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.get(name).map(|entry| &entry.value)
    }

    pub fn number(&self, name: &str) -> Result<f64, DeviceError> {
        let value = self.require(name)?;
        value.as_number().ok_or_else(|| DeviceError::TypeMismatch {
            property: name.to_owned(),
            expected: crate::value::BaseType::Number,
            actual: value.base_type(),
        })
    }

    pub fn boolean(&self, name: &str) -> Result<bool, DeviceError> {
        let value = self.require(name)?;
        value.as_boolean().ok_or_else(|| DeviceError::TypeMismatch {
            property: name.to_owned(),
            expected: crate::value::BaseType::Boolean,
            actual: value.base_type(),
        })
    }

    fn require(&self, name: &str) -> Result<&PropertyValue, DeviceError> {
        self.get(name).ok_or_else(|| DeviceError::UnknownProperty {
            device: self.device.clone(),
            property: name.to_owned(),
        })
    }

    pub fn has_dirty(&self) -> bool {
        self.entries.values().any(|entry| entry.dirty)
    }

    /// Drains the change set, clearing every dirty flag.
    pub fn take_dirty(&mut self) -> Vec<PropertyUpdate> {
        self.entries
            .iter_mut()
            .filter(|(_, entry)| entry.dirty)
            .map(|(name, entry)| {
                entry.dirty = false;
                PropertyUpdate {
                    name: (*name).to_owned(),
                    value: entry.value.clone(),
                    timestamp: entry.changed_at,
                }
            })
            .collect()
    }

    pub fn mark_all_dirty(&mut self) {
        for entry in self.entries.values_mut() {
            entry.dirty = true;
        }
    }

    /// Reschedules the named properties, e.g. after the platform rejected a push.
    pub fn mark_dirty<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            if let Some(entry) = self.entries.get_mut(name) {
                entry.dirty = true;
            }
        }
    }

    pub fn snapshot(&self) -> Vec<PropertyUpdate> {
        self.entries
            .iter()
            .map(|(name, entry)| PropertyUpdate {
                name: (*name).to_owned(),
                value: entry.value.clone(),
                timestamp: entry.changed_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{names, STEAM_SENSOR};

    fn store() -> PropertyStore {
        PropertyStore::new(
            "SteamSensor",
            &STEAM_SENSOR,
            GeoPoint::new(40.0573, -75.67072, 0.0),
            Utc::now(),
        )
    }

    #[test]
    fn new_store_holds_zero_values_and_no_changes() {
        let store = store();
        assert_eq!(store.len(), 7);
        assert_eq!(store.number(names::TEMPERATURE).unwrap(), 0.0);
        assert!(!store.boolean(names::FAULT_STATUS).unwrap());
        assert_eq!(
            store.get(names::LOCATION).and_then(PropertyValue::as_location),
            Some(GeoPoint::new(40.0573, -75.67072, 0.0))
        );
        assert!(!store.has_dirty());
    }

    #[test]
    fn writes_are_type_checked() {
        let mut store = store();
        let err = store
            .set(names::TEMPERATURE, PropertyValue::Boolean(true), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DeviceError::TypeMismatch { .. }));
        let err = store
            .set("Humidity", PropertyValue::Number(1.0), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DeviceError::UnknownProperty { .. }));
    }

    #[test]
    fn take_dirty_returns_only_changed_values_once() {
        let mut store = store();
        store
            .set(names::TEMPERATURE, PropertyValue::Number(410.0), Utc::now())
            .unwrap();
        store
            .set(names::FAULT_STATUS, PropertyValue::Boolean(false), Utc::now())
            .unwrap();
        let updates = store.take_dirty();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].name, names::TEMPERATURE);
        assert!(store.take_dirty().is_empty());
    }

    #[test]
    fn remote_writes_are_not_pushed_back() {
        let mut store = store();
        store
            .apply_remote(names::TEMPERATURE_LIMIT, PropertyValue::Number(150.0), Utc::now())
            .unwrap();
        assert_eq!(store.number(names::TEMPERATURE_LIMIT).unwrap(), 150.0);
        assert!(!store.has_dirty());
    }

    #[test]
    fn mark_dirty_reschedules_named_values_only() {
        let mut store = store();
        store
            .set(names::TEMPERATURE, PropertyValue::Number(410.0), Utc::now())
            .unwrap();
        let taken = store.take_dirty();
        store.mark_dirty(taken.iter().map(|update| update.name.as_str()));
        store.mark_dirty(["Humidity"]);
        let again = store.take_dirty();
        assert_eq!(again, taken);
    }

    #[test]
    fn mark_all_dirty_schedules_full_set_in_declaration_order() {
        let mut store = store();
        store.mark_all_dirty();
        let names: Vec<String> = store.take_dirty().into_iter().map(|u| u.name).collect();
        assert_eq!(
            names,
            vec![
                "Temperature",
                "Pressure",
                "FaultStatus",
                "InletValve",
                "TemperatureLimit",
                "Location",
                "TotalFlow"
            ]
        );
    }
}
