//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Tagged property values exchanged with the remote platform."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use steamfleet_sim::GeoPoint;

/// Declared type of a property or data shape field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaseType {
    Number,
    Boolean,
    String,
    Timestamp,
    Location,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BaseType::Number => "NUMBER",
            BaseType::Boolean => "BOOLEAN",
            BaseType::String => "STRING",
            BaseType::Timestamp => "DATETIME",
            BaseType::Location => "LOCATION",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Number(f64),
    Boolean(bool),
    String(String),
    Timestamp(DateTime<Utc>),
    Location(GeoPoint),
}

impl PropertyValue {
    pub fn base_type(&self) -> BaseType {
        match self {
            PropertyValue::Number(_) => BaseType::Number,
            PropertyValue::Boolean(_) => BaseType::Boolean,
            PropertyValue::String(_) => BaseType::String,
            PropertyValue::Timestamp(_) => BaseType::Timestamp,
            PropertyValue::Location(_) => BaseType::Location,
        }
    }

    /// Zero value used to seed a freshly created property.
    pub fn initial(base_type: BaseType, now: DateTime<Utc>, location: GeoPoint) -> Self {
        match base_type {
            BaseType::Number => PropertyValue::Number(0.0),
            BaseType::Boolean => PropertyValue::Boolean(false),
            BaseType::String => PropertyValue::String(String::new()),
            BaseType::Timestamp => PropertyValue::Timestamp(now),
            BaseType::Location => PropertyValue::Location(location),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<GeoPoint> {
        match self {
            PropertyValue::Location(point) => Some(*point),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(value) => write!(f, "{}", value),
            PropertyValue::Boolean(value) => write!(f, "{}", value),
            PropertyValue::String(value) => f.write_str(value),
            PropertyValue::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
            PropertyValue::Location(point) => write!(
                f,
                "{},{},{}",
                point.latitude, point.longitude, point.elevation
            ),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl From<GeoPoint> for PropertyValue {
    fn from(point: GeoPoint) -> Self {
        PropertyValue::Location(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_values_follow_base_type() {
        let now = Utc::now();
        let origin = GeoPoint::new(1.0, 2.0, 0.0);
        assert_eq!(
            PropertyValue::initial(BaseType::Number, now, origin),
            PropertyValue::Number(0.0)
        );
        assert_eq!(
            PropertyValue::initial(BaseType::Boolean, now, origin),
            PropertyValue::Boolean(false)
        );
        assert_eq!(
            PropertyValue::initial(BaseType::Location, now, origin).as_location(),
            Some(origin)
        );
    }

    #[test]
    fn accessors_reject_other_variants() {
        let value = PropertyValue::from(true);
        assert_eq!(value.base_type(), BaseType::Boolean);
        assert_eq!(value.as_number(), None);
        assert_eq!(value.as_boolean(), Some(true));
        assert_eq!(PropertyValue::from(150.0).to_string(), "150");
    }
}
