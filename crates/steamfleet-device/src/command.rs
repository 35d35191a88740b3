//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Remote services exposed by every steam sensor."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

/// Length of the payload returned by [`DeviceCommand::GetBigString`].
pub const BIG_STRING_LEN: usize = 24_000;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    GetReadings,
    AddNumbers { a: f64, b: f64 },
    GetBigString,
    StartLogging,
    StopLogging,
    Shutdown,
}

impl DeviceCommand {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::GetReadings => "GetSteamSensorReadings",
            DeviceCommand::AddNumbers { .. } => "AddNumbers",
            DeviceCommand::GetBigString => "GetBigString",
            DeviceCommand::StartLogging => "StartLogging",
            DeviceCommand::StopLogging => "StopLogging",
            DeviceCommand::Shutdown => "Shutdown",
        }
    }
}

/// Row of the `SteamSensorReadings` data shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorReading {
    pub sensor_name: String,
    pub activation_time: DateTime<Utc>,
    pub outside_temperature: f64,
    pub barometric_pressure: f64,
    pub current_fault_status: bool,
    pub current_inlet_valve: bool,
    pub rated_temperature_limit: f64,
    pub total_flow_amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Number(f64),
    Text(String),
    Readings(Vec<SensorReading>),
    Nothing,
}

/// Schedules a process shutdown after `delay`.
///
/// Returns `false` when a shutdown is already pending and the request was ignored.
pub trait ShutdownRequester: Send + Sync {
    fn request_shutdown(&self, delay: Duration) -> bool;
}

/// Fixed demonstration table answered by `GetSteamSensorReadings`.
pub fn demo_readings(now: DateTime<Utc>) -> Vec<SensorReading> {
    const ROWS: [(&str, f64, f64, bool, bool, f64); 5] = [
        ("Sensor Alpha", 50.0, 15.0, false, true, 87.0),
        ("Sensor Beta", 60.0, 25.0, true, true, 77.0),
        ("Sensor Gamma", 70.0, 30.0, true, true, 67.0),
        ("Sensor Delta", 80.0, 35.0, false, true, 57.0),
        ("Sensor Epsilon", 90.0, 40.0, true, false, 47.0),
    ];
    ROWS.iter()
        .zip(1i64..)
        .map(
            |(&(name, temperature, pressure, fault, inlet, flow), days)| SensorReading {
                sensor_name: name.to_owned(),
                activation_time: now + ChronoDuration::days(days),
                outside_temperature: temperature,
                barometric_pressure: pressure,
                current_fault_status: fault,
                current_inlet_valve: inlet,
                rated_temperature_limit: 150.0,
                total_flow_amount: flow,
            },
        )
        .collect()
}

pub fn big_string() -> String {
    "0".repeat(BIG_STRING_LEN)
}
