//! Transit records served to map clients.
//!
//! JSON field names are part of the client protocol and must not change.

use serde::{Deserialize, Serialize};

/// A single stop from the static GTFS feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    pub code: String,
    pub name: String,
    pub desc: String,
    pub lat: f64,
    pub lng: f64,
    pub zone_id: String,
    pub url: String,
    pub location_type: i32,
    pub parent_station: String,
    pub wheelchair_boarding: i32,
}

/// A stop found by a search. `distance` is in meters from the search point
/// and only present for distance searches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopWithDistance {
    #[serde(flatten)]
    pub stop: Stop,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl From<Stop> for StopWithDistance {
    fn from(stop: Stop) -> Self {
        Self {
            stop,
            distance: None,
        }
    }
}

/// A single route from the static GTFS feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub agency_id: String,
    pub short_name: String,
    pub long_name: String,
    #[serde(rename = "type")]
    pub route_type: i32,
    pub url: String,
    pub color: String,
    pub text_color: String,
    pub sort_order: i32,
}

/// The drawable line of a route: the shape used by most of its trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteShape {
    pub route_id: String,
    pub route_type: i32,
    pub color: String,
    pub text_color: String,
    pub shape_id: String,
    /// Ordered `[lat, lng]` pairs.
    pub points: Vec<[f64; 2]>,
}

/// One GTFS shape with the routes whose trips use it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: String,
    pub route_ids: Vec<String>,
    /// Ordered `[lat, lng]` pairs.
    pub points: Vec<[f64; 2]>,
}

/// A live vehicle position joined with the type of the route it serves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_id: String,
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub route_type: Option<i32>,
    pub lat: f64,
    pub lng: f64,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

/// Returns the newest timestamp in `vehicles`, or `since` if none is newer.
pub fn high_water_mark(since: u64, vehicles: &[VehiclePosition]) -> u64 {
    vehicles
        .iter()
        .map(|v| v.timestamp)
        .fold(since, u64::max)
}
