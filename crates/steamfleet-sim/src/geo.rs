//! ---
//! fleet_section: "11-simulation"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Waypoint routes simulating sensor movement."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::signals::SignalError;

/// Geographic coordinate reported through the `Location` property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
        }
    }
}

// Out along the creek path and back again; the last point closes the loop.
const STEAM_LOOP: [GeoPoint; 29] = [
    GeoPoint::new(40.0573, -75.67072, 0.0),
    GeoPoint::new(40.05971, -75.67428, 0.0),
    GeoPoint::new(40.06189, -75.67595, 0.0),
    GeoPoint::new(40.06322, -75.67791, 0.0),
    GeoPoint::new(40.06469, -75.67906, 0.0),
    GeoPoint::new(40.06534, -75.68052, 0.0),
    GeoPoint::new(40.06577, -75.68218, 0.0),
    GeoPoint::new(40.06498, -75.68393, 0.0),
    GeoPoint::new(40.06431, -75.68457, 0.0),
    GeoPoint::new(40.06374, -75.6851, 0.0),
    GeoPoint::new(40.06302, -75.68588, 0.0),
    GeoPoint::new(40.06259, -75.68534, 0.0),
    GeoPoint::new(40.06213, -75.68449, 0.0),
    GeoPoint::new(40.06133, -75.68366, 0.0),
    GeoPoint::new(40.0618, -75.68459, 0.0),
    GeoPoint::new(40.06133, -75.68366, 0.0),
    GeoPoint::new(40.06213, -75.68449, 0.0),
    GeoPoint::new(40.06259, -75.68534, 0.0),
    GeoPoint::new(40.06302, -75.68588, 0.0),
    GeoPoint::new(40.06374, -75.6851, 0.0),
    GeoPoint::new(40.06431, -75.68457, 0.0),
    GeoPoint::new(40.06498, -75.68393, 0.0),
    GeoPoint::new(40.06577, -75.68218, 0.0),
    GeoPoint::new(40.06534, -75.68052, 0.0),
    GeoPoint::new(40.06469, -75.67906, 0.0),
    GeoPoint::new(40.06322, -75.67791, 0.0),
    GeoPoint::new(40.06189, -75.67595, 0.0),
    GeoPoint::new(40.05971, -75.67428, 0.0),
    GeoPoint::new(40.0573, -75.67072, 0.0),
];

/// Fixed, ordered, non-empty sequence of waypoints walked cyclically.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    waypoints: Vec<GeoPoint>,
}

impl Route {
    pub fn new(waypoints: Vec<GeoPoint>) -> Result<Self, SignalError> {
        if waypoints.is_empty() {
            return Err(SignalError::EmptyRoute);
        }
        Ok(Self { waypoints })
    }

    /// The default loop walked by every steam sensor.
    pub fn steam_loop() -> Self {
        Self {
            waypoints: STEAM_LOOP.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn first(&self) -> GeoPoint {
        self.waypoints[0]
    }

    /// Waypoint at `index`, wrapped into range.
    pub fn waypoint(&self, index: usize) -> GeoPoint {
        self.waypoints[index % self.waypoints.len()]
    }

    /// Index following `index`, wrapping to 0 after the last waypoint.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.waypoints.len()
    }

    pub fn waypoints(&self) -> &[GeoPoint] {
        &self.waypoints
    }
}

impl Default for Route {
    fn default() -> Self {
        Self::steam_loop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steam_loop_starts_and_ends_at_the_same_place() {
        let route = Route::steam_loop();
        assert_eq!(route.len(), 29);
        assert_eq!(route.first(), route.waypoint(route.len() - 1));
    }

    #[test]
    fn next_index_wraps_after_last_waypoint() {
        let route = Route::new(vec![
            GeoPoint::new(1.0, 1.0, 0.0),
            GeoPoint::new(2.0, 2.0, 0.0),
            GeoPoint::new(3.0, 3.0, 0.0),
        ])
        .unwrap();
        let mut index = 0;
        let mut visited = Vec::new();
        for _ in 0..route.len() {
            index = route.next_index(index);
            visited.push(index);
        }
        assert_eq!(visited, vec![1, 2, 0]);
        assert_eq!(route.waypoint(index), route.first());
    }

    #[test]
    fn empty_route_is_rejected() {
        assert!(matches!(Route::new(Vec::new()), Err(SignalError::EmptyRoute)));
    }

    #[test]
    fn geo_point_serializes_with_named_fields() {
        let json = serde_json::to_value(GeoPoint::new(40.0, -75.0, 0.0)).unwrap();
        assert_eq!(json["latitude"], 40.0);
        assert_eq!(json["longitude"], -75.0);
    }
}
