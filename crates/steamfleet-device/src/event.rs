//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Alert events queued for delivery to the remote platform."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::schema::names;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEvent {
    pub name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl DeviceEvent {
    pub fn fault(temperature: f64, limit: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: names::FAULT_EVENT.to_owned(),
            message: format!("Temperature at {} was above limit of {}", temperature, limit),
            timestamp,
        }
    }
}

/// FIFO of events not yet flushed.
#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    pending: VecDeque<DeviceEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: DeviceEvent) {
        self.pending.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<DeviceEvent> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceEvent> {
        self.pending.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_message_names_temperature_and_limit() {
        let event = DeviceEvent::fault(160.0, 150.0, Utc::now());
        assert_eq!(event.name, "SteamSensorFault");
        assert_eq!(event.message, "Temperature at 160 was above limit of 150");
    }

    #[test]
    fn drain_empties_queue_in_order() {
        let mut queue = EventQueue::default();
        queue.push(DeviceEvent::fault(1.0, 0.5, Utc::now()));
        queue.push(DeviceEvent::fault(2.0, 0.5, Utc::now()));
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained[0].message.starts_with("Temperature at 1 "));
        assert!(queue.is_empty());
    }
}
