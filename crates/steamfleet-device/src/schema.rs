//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Static property, event and data shape tables for steam sensors."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
//! The thing shape of a device is declared as plain static tables and checked
//! once by [`ThingShape::validate`] when a device is built.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::SchemaError;
use crate::value::BaseType;

pub mod names {
    pub const TEMPERATURE: &str = "Temperature";
    pub const PRESSURE: &str = "Pressure";
    pub const FAULT_STATUS: &str = "FaultStatus";
    pub const INLET_VALVE: &str = "InletValve";
    pub const TEMPERATURE_LIMIT: &str = "TemperatureLimit";
    pub const LOCATION: &str = "Location";
    pub const TOTAL_FLOW: &str = "TotalFlow";

    pub const FAULT_EVENT: &str = "SteamSensorFault";
    pub const FAULT_DATA_SHAPE: &str = "SteamSensor.Fault";
    pub const READINGS_DATA_SHAPE: &str = "SteamSensorReadings";
    pub const MESSAGE_FIELD: &str = "message";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropertyCategory {
    Status,
    Faults,
    Aggregates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropertyDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub base_type: BaseType,
    pub category: PropertyCategory,
    /// Read-only from the remote side; the device itself may always write.
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDefinition {
    pub name: &'static str,
    pub base_type: Option<BaseType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataShape {
    pub name: &'static str,
    pub fields: &'static [FieldDefinition],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub data_shape: &'static str,
    pub category: PropertyCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThingShape {
    pub name: &'static str,
    pub properties: &'static [PropertyDefinition],
    pub events: &'static [EventDefinition],
    pub data_shapes: &'static [DataShape],
}

const fn property(
    name: &'static str,
    description: &'static str,
    base_type: BaseType,
    category: PropertyCategory,
    read_only: bool,
) -> PropertyDefinition {
    PropertyDefinition {
        name,
        description,
        base_type,
        category,
        read_only,
    }
}

const fn field(name: &'static str, base_type: BaseType) -> FieldDefinition {
    FieldDefinition {
        name,
        base_type: Some(base_type),
    }
}

const STEAM_SENSOR_PROPERTIES: &[PropertyDefinition] = &[
    property(
        names::TEMPERATURE,
        "Current Temperature",
        BaseType::Number,
        PropertyCategory::Status,
        true,
    ),
    property(
        names::PRESSURE,
        "Current Pressure",
        BaseType::Number,
        PropertyCategory::Status,
        true,
    ),
    property(
        names::FAULT_STATUS,
        "Fault status",
        BaseType::Boolean,
        PropertyCategory::Faults,
        true,
    ),
    property(
        names::INLET_VALVE,
        "Inlet valve state",
        BaseType::Boolean,
        PropertyCategory::Status,
        true,
    ),
    property(
        names::TEMPERATURE_LIMIT,
        "Temperature fault limit",
        BaseType::Number,
        PropertyCategory::Faults,
        false,
    ),
    property(
        names::LOCATION,
        "Location of sensor",
        BaseType::Location,
        PropertyCategory::Status,
        true,
    ),
    property(
        names::TOTAL_FLOW,
        "Total flow",
        BaseType::Number,
        PropertyCategory::Aggregates,
        true,
    ),
];

const STEAM_SENSOR_EVENTS: &[EventDefinition] = &[EventDefinition {
    name: names::FAULT_EVENT,
    description: "Steam sensor fault",
    data_shape: names::FAULT_DATA_SHAPE,
    category: PropertyCategory::Faults,
}];

const STEAM_SENSOR_DATA_SHAPES: &[DataShape] = &[
    DataShape {
        name: names::FAULT_DATA_SHAPE,
        fields: &[field(names::MESSAGE_FIELD, BaseType::String)],
    },
    DataShape {
        name: names::READINGS_DATA_SHAPE,
        fields: &[
            field("SensorName", BaseType::String),
            field("ActivationTime", BaseType::Timestamp),
            field("OutsideTemperature", BaseType::Number),
            field("BarometricPressure", BaseType::Number),
            field("CurrentFaultStatus", BaseType::Boolean),
            field("CurrentInletValve", BaseType::Boolean),
            field("RatedTemperatureLimit", BaseType::Number),
            field("TotalFlowAmount", BaseType::Number),
        ],
    },
];

pub const STEAM_SENSOR: ThingShape = ThingShape {
    name: "SteamSensor",
    properties: STEAM_SENSOR_PROPERTIES,
    events: STEAM_SENSOR_EVENTS,
    data_shapes: STEAM_SENSOR_DATA_SHAPES,
};

impl ThingShape {
    pub fn property(&self, name: &str) -> Option<&'static PropertyDefinition> {
        self.properties.iter().find(|definition| definition.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&'static EventDefinition> {
        self.events.iter().find(|definition| definition.name == name)
    }

    pub fn data_shape(&self, name: &str) -> Option<&'static DataShape> {
        self.data_shapes.iter().find(|shape| shape.name == name)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for definition in self.properties {
            if !seen.insert(definition.name) {
                return Err(SchemaError::DuplicateProperty(definition.name.to_owned()));
            }
        }

        for shape in self.data_shapes {
            let mut fields = HashSet::new();
            for field in shape.fields {
                if !fields.insert(field.name) {
                    return Err(SchemaError::DuplicateField {
                        owner: shape.name.to_owned(),
                        field: field.name.to_owned(),
                    });
                }
                if field.base_type.is_none() {
                    return Err(SchemaError::UntypedField {
                        owner: shape.name.to_owned(),
                        field: field.name.to_owned(),
                    });
                }
            }
        }

        let mut events = HashSet::new();
        for event in self.events {
            if !events.insert(event.name) {
                return Err(SchemaError::DuplicateEvent(event.name.to_owned()));
            }
            if self.data_shape(event.data_shape).is_none() {
                return Err(SchemaError::UnknownDataShape {
                    event: event.name.to_owned(),
                    data_shape: event.data_shape.to_owned(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steam_sensor_shape_is_valid() {
        STEAM_SENSOR.validate().unwrap();
        assert_eq!(STEAM_SENSOR.properties.len(), 7);
        let limit = STEAM_SENSOR.property(names::TEMPERATURE_LIMIT).unwrap();
        assert!(!limit.read_only);
        assert!(STEAM_SENSOR
            .properties
            .iter()
            .filter(|definition| definition.name != names::TEMPERATURE_LIMIT)
            .all(|definition| definition.read_only));
        let fault = STEAM_SENSOR.event(names::FAULT_EVENT).unwrap();
        let shape = STEAM_SENSOR.data_shape(fault.data_shape).unwrap();
        assert_eq!(shape.fields[0].name, names::MESSAGE_FIELD);
    }

    #[test]
    fn duplicate_properties_are_rejected() {
        const DUPLICATED: &[PropertyDefinition] = &[
            property("A", "", BaseType::Number, PropertyCategory::Status, true),
            property("A", "", BaseType::Boolean, PropertyCategory::Status, true),
        ];
        let shape = ThingShape {
            name: "Broken",
            properties: DUPLICATED,
            events: &[],
            data_shapes: &[],
        };
        assert_eq!(
            shape.validate(),
            Err(SchemaError::DuplicateProperty("A".into()))
        );
    }

    #[test]
    fn untyped_event_fields_are_rejected() {
        const SHAPES: &[DataShape] = &[DataShape {
            name: "Loose",
            fields: &[FieldDefinition {
                name: "message",
                base_type: None,
            }],
        }];
        let shape = ThingShape {
            name: "Broken",
            properties: &[],
            events: &[],
            data_shapes: SHAPES,
        };
        assert!(matches!(
            shape.validate(),
            Err(SchemaError::UntypedField { .. })
        ));
    }

    #[test]
    fn events_must_reference_known_data_shapes() {
        const EVENTS: &[EventDefinition] = &[EventDefinition {
            name: "Orphan",
            description: "",
            data_shape: "Missing",
            category: PropertyCategory::Faults,
        }];
        let shape = ThingShape {
            name: "Broken",
            properties: &[],
            events: EVENTS,
            data_shapes: &[],
        };
        assert!(matches!(
            shape.validate(),
            Err(SchemaError::UnknownDataShape { .. })
        ));
    }
}
