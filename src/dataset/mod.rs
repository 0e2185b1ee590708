//! Read-only dataset providers.
//!
//! Live sessions and the JSON endpoints only see these traits. Providers are
//! shared by every connection, so implementations must tolerate concurrent
//! callers.

mod gtfs_static;
mod realtime;

pub use gtfs_static::StaticNetwork;
pub use realtime::RealtimeVehicles;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use geo::Point;

use crate::model::{Route, RouteShape, Shape, Stop, StopWithDistance, VehiclePosition};
use crate::spatial::BoundingBox;

/// `since` value asking a [`VehicleDataset`] for every known position.
pub const ALL_RECORDS: u64 = 0;

#[async_trait]
pub trait StopDataset: Send + Sync {
    async fn fetch_all_stops(&self) -> Result<Vec<Stop>>;

    /// Stops within `radius_m` meters of `center`, nearest first.
    async fn fetch_within_distance(
        &self,
        center: Point,
        radius_m: f64,
    ) -> Result<Vec<StopWithDistance>>;

    async fn fetch_within_box(&self, bounds: BoundingBox) -> Result<Vec<Stop>>;
}

#[async_trait]
pub trait RouteDataset: Send + Sync {
    async fn fetch_routes(&self) -> Result<Vec<Route>>;
}

#[async_trait]
pub trait ShapeDataset: Send + Sync {
    async fn fetch_route_shapes(&self) -> Result<Vec<RouteShape>>;

    /// Shapes used by any route in `route_ids` plus the shapes named in
    /// `shape_ids`, each listed once.
    async fn fetch_shapes(&self, route_ids: &[String], shape_ids: &[String])
    -> Result<Vec<Shape>>;
}

#[async_trait]
pub trait VehicleDataset: Send + Sync {
    /// Returns positions with a timestamp strictly newer than `since`.
    ///
    /// [`ALL_RECORDS`] returns the full set, including positions that carry
    /// no timestamp at all.
    async fn fetch_vehicle_positions(&self, since: u64) -> Result<Vec<VehiclePosition>>;
}

/// The four providers a live session gathers from.
#[derive(Clone)]
pub struct Datasets {
    pub stops: Arc<dyn StopDataset>,
    pub routes: Arc<dyn RouteDataset>,
    pub shapes: Arc<dyn ShapeDataset>,
    pub vehicles: Arc<dyn VehicleDataset>,
}

impl Datasets {
    /// Serves stops, routes and shapes from one static network.
    pub fn new(network: Arc<StaticNetwork>, vehicles: Arc<dyn VehicleDataset>) -> Self {
        Self {
            stops: network.clone(),
            routes: network.clone(),
            shapes: network,
            vehicles,
        }
    }
}
