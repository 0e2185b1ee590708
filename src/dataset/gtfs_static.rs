//! Static GTFS loader.
//!
//! Reads `stops.txt`, `routes.txt`, `trips.txt` and `shapes.txt` from an
//! unpacked GTFS directory into memory once at startup.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use geo::Point;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{RouteDataset, ShapeDataset, StopDataset};
use crate::model::{Route, RouteShape, Shape, Stop, StopWithDistance};
use crate::spatial::{BoundingBox, haversine_distance, stop_point};

#[derive(Debug, Deserialize)]
struct StopRow {
    stop_id: String,
    #[serde(default)]
    stop_code: String,
    #[serde(default)]
    stop_name: String,
    #[serde(default)]
    stop_desc: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    stop_lat: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    stop_lon: Option<f64>,
    #[serde(default)]
    zone_id: String,
    #[serde(default)]
    stop_url: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    location_type: Option<i32>,
    #[serde(default)]
    parent_station: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    wheelchair_boarding: Option<i32>,
}

impl From<StopRow> for Stop {
    fn from(row: StopRow) -> Self {
        Stop {
            id: row.stop_id,
            code: row.stop_code,
            name: row.stop_name,
            desc: row.stop_desc,
            lat: row.stop_lat.unwrap_or_default(),
            lng: row.stop_lon.unwrap_or_default(),
            zone_id: row.zone_id,
            url: row.stop_url,
            location_type: row.location_type.unwrap_or_default(),
            parent_station: row.parent_station,
            wheelchair_boarding: row.wheelchair_boarding.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    route_id: String,
    #[serde(default)]
    agency_id: String,
    #[serde(default)]
    route_short_name: String,
    #[serde(default)]
    route_long_name: String,
    route_type: i32,
    #[serde(default)]
    route_url: String,
    #[serde(default)]
    route_color: String,
    #[serde(default)]
    route_text_color: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    route_sort_order: Option<i32>,
}

impl From<RouteRow> for Route {
    fn from(row: RouteRow) -> Self {
        Route {
            id: row.route_id,
            agency_id: row.agency_id,
            short_name: row.route_short_name,
            long_name: row.route_long_name,
            route_type: row.route_type,
            url: row.route_url,
            color: row.route_color,
            text_color: row.route_text_color,
            sort_order: row.route_sort_order.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TripRow {
    route_id: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    shape_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShapePointRow {
    shape_id: String,
    shape_pt_lat: f64,
    shape_pt_lon: f64,
    shape_pt_sequence: i64,
}

/// Stops, routes and shapes held in memory.
#[derive(Debug, Default)]
pub struct StaticNetwork {
    stops: Vec<Stop>,
    routes: Vec<Route>,
    route_shapes: Vec<RouteShape>,
    shapes: Vec<Shape>,
}

impl StaticNetwork {
    pub fn new(stops: Vec<Stop>, routes: Vec<Route>, route_shapes: Vec<RouteShape>) -> Self {
        Self {
            stops,
            routes,
            route_shapes,
            shapes: Vec::new(),
        }
    }

    pub fn with_shapes(mut self, shapes: Vec<Shape>) -> Self {
        self.shapes = shapes;
        self
    }

    /// Loads a network from an unpacked GTFS directory.
    ///
    /// `stops.txt` and `routes.txt` are required. Without `trips.txt` and
    /// `shapes.txt` the network simply has no route shapes.
    ///
    /// # Errors
    ///
    /// Returns an error if a required file is missing or any row fails to parse.
    #[tracing::instrument(fields(dir = %dir.display()))]
    pub fn load(dir: &Path) -> Result<Self> {
        let stops: Vec<Stop> = read_rows::<StopRow>(&dir.join("stops.txt"))?
            .into_iter()
            .map(Stop::from)
            .collect();
        let routes: Vec<Route> = read_rows::<RouteRow>(&dir.join("routes.txt"))?
            .into_iter()
            .map(Route::from)
            .collect();

        let trips_path = dir.join("trips.txt");
        let shapes_path = dir.join("shapes.txt");
        let (shapes, route_shapes) = if trips_path.exists() && shapes_path.exists() {
            let trips = read_rows::<TripRow>(&trips_path)?;
            let points = read_rows::<ShapePointRow>(&shapes_path)?;
            let shapes = build_shapes(&trips, points);
            let route_shapes = build_route_shapes(&routes, &trips, &shapes);
            (shapes, route_shapes)
        } else {
            debug!("trips.txt or shapes.txt missing, skipping shapes");
            (Vec::new(), Vec::new())
        };

        info!(
            stops = stops.len(),
            routes = routes.len(),
            shapes = shapes.len(),
            route_shapes = route_shapes.len(),
            "Static network loaded"
        );

        Ok(Self::new(stops, routes, route_shapes).with_shapes(shapes))
    }

    /// Maps route id to GTFS route type, for joining onto live vehicles.
    pub fn route_types(&self) -> HashMap<String, i32> {
        self.routes
            .iter()
            .map(|r| (r.id.clone(), r.route_type))
            .collect()
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.with_context(|| format!("Failed to parse row in {}", path.display()))?);
    }
    Ok(rows)
}

/// Groups shape points into ordered lines and records which routes use each
/// shape. Shapes come out sorted by id.
fn build_shapes(trips: &[TripRow], points: Vec<ShapePointRow>) -> Vec<Shape> {
    let mut used_by: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for trip in trips {
        if let Some(shape_id) = trip.shape_id.as_deref() {
            used_by
                .entry(shape_id)
                .or_default()
                .insert(trip.route_id.as_str());
        }
    }

    let mut lines: BTreeMap<String, Vec<(i64, [f64; 2])>> = BTreeMap::new();
    for p in points {
        lines
            .entry(p.shape_id)
            .or_default()
            .push((p.shape_pt_sequence, [p.shape_pt_lat, p.shape_pt_lon]));
    }

    lines
        .into_iter()
        .map(|(id, mut line)| {
            line.sort_by_key(|(seq, _)| *seq);
            let route_ids = used_by
                .get(id.as_str())
                .map(|routes| routes.iter().map(|r| r.to_string()).collect())
                .unwrap_or_default();
            Shape {
                id,
                route_ids,
                points: line.into_iter().map(|(_, pt)| pt).collect(),
            }
        })
        .collect()
}

/// Picks, for each route, the shape referenced by the most trips. Ties go to
/// the lexicographically smallest shape id so loads are deterministic.
fn build_route_shapes(routes: &[Route], trips: &[TripRow], shapes: &[Shape]) -> Vec<RouteShape> {
    let mut usage: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
    for trip in trips {
        if let Some(shape_id) = trip.shape_id.as_deref() {
            *usage
                .entry(trip.route_id.as_str())
                .or_default()
                .entry(shape_id)
                .or_default() += 1;
        }
    }

    let by_id: HashMap<&str, &Shape> = shapes.iter().map(|s| (s.id.as_str(), s)).collect();

    routes
        .iter()
        .filter_map(|route| {
            let (shape_id, _) = usage
                .get(route.id.as_str())?
                .iter()
                .max_by(|(a_id, a_n), (b_id, b_n)| a_n.cmp(b_n).then_with(|| b_id.cmp(a_id)))?;
            let shape = by_id.get(*shape_id)?;

            Some(RouteShape {
                route_id: route.id.clone(),
                route_type: route.route_type,
                color: route.color.clone(),
                text_color: route.text_color.clone(),
                shape_id: shape.id.clone(),
                points: shape.points.clone(),
            })
        })
        .collect()
}

#[async_trait]
impl StopDataset for StaticNetwork {
    async fn fetch_all_stops(&self) -> Result<Vec<Stop>> {
        Ok(self.stops.clone())
    }

    async fn fetch_within_distance(
        &self,
        center: Point,
        radius_m: f64,
    ) -> Result<Vec<StopWithDistance>> {
        if radius_m < 0.0 || !radius_m.is_finite() {
            return Ok(Vec::new());
        }

        let mut found: Vec<StopWithDistance> = self
            .stops
            .iter()
            .filter_map(|stop| {
                let distance = haversine_distance(center, stop_point(stop));
                (distance <= radius_m).then(|| StopWithDistance {
                    stop: stop.clone(),
                    distance: Some(distance),
                })
            })
            .collect();
        found.sort_by(|a, b| a.distance.unwrap_or_default().total_cmp(&b.distance.unwrap_or_default()));
        Ok(found)
    }

    async fn fetch_within_box(&self, bounds: BoundingBox) -> Result<Vec<Stop>> {
        Ok(self
            .stops
            .iter()
            .filter(|stop| bounds.contains(stop_point(stop)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RouteDataset for StaticNetwork {
    async fn fetch_routes(&self) -> Result<Vec<Route>> {
        Ok(self.routes.clone())
    }
}

#[async_trait]
impl ShapeDataset for StaticNetwork {
    async fn fetch_route_shapes(&self) -> Result<Vec<RouteShape>> {
        Ok(self.route_shapes.clone())
    }

    async fn fetch_shapes(&self, route_ids: &[String], shape_ids: &[String]) -> Result<Vec<Shape>> {
        let route_ids: HashSet<&str> = route_ids.iter().map(String::as_str).collect();
        let shape_ids: HashSet<&str> = shape_ids.iter().map(String::as_str).collect();

        Ok(self
            .shapes
            .iter()
            .filter(|shape| {
                shape_ids.contains(shape.id.as_str())
                    || shape.route_ids.iter().any(|r| route_ids.contains(r.as_str()))
            })
            .cloned()
            .collect())
    }
}
