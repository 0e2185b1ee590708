//! Fan-out fetch of a session's initial snapshot.

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error};

use super::protocol::Totals;
use crate::dataset::{ALL_RECORDS, Datasets};
use crate::model::{Route, RouteShape, Stop, VehiclePosition, high_water_mark};

/// The collections a session pushes to its client.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub stops: Vec<Stop>,
    pub routes: Vec<Route>,
    pub route_shapes: Vec<RouteShape>,
    pub vehicles: Vec<VehiclePosition>,
}

impl Snapshot {
    pub fn totals(&self) -> Totals {
        Totals {
            stops: self.stops.len(),
            routes: self.routes.len(),
            route_shapes: self.route_shapes.len(),
            vehicles: self.vehicles.len(),
        }
    }
}

/// A gathered snapshot plus the newest vehicle timestamp seen in it.
#[derive(Debug, Clone, Default)]
pub struct Aggregated {
    pub snapshot: Snapshot,
    pub since: u64,
}

/// Fetches all four datasets in parallel and waits for every fetch to finish.
///
/// A failing fetch is logged and cancels `cancel`, but the remaining fetches
/// are still awaited so none outlive the session. Returns `None` if anything
/// failed or the session was cancelled while gathering.
pub async fn aggregate(
    datasets: &Datasets,
    fetch_timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Option<Aggregated> {
    let stops = {
        let ds = datasets.stops.clone();
        spawn_fetch("stops", fetch_timeout, cancel, async move {
            ds.fetch_all_stops().await
        })
    };
    let routes = {
        let ds = datasets.routes.clone();
        spawn_fetch("routes", fetch_timeout, cancel, async move {
            ds.fetch_routes().await
        })
    };
    let route_shapes = {
        let ds = datasets.shapes.clone();
        spawn_fetch("route_shapes", fetch_timeout, cancel, async move {
            ds.fetch_route_shapes().await
        })
    };
    let vehicles = {
        let ds = datasets.vehicles.clone();
        spawn_fetch("vehicles", fetch_timeout, cancel, async move {
            ds.fetch_vehicle_positions(ALL_RECORDS).await
        })
    };

    let (stops, routes, route_shapes, vehicles) =
        tokio::join!(stops, routes, route_shapes, vehicles);

    let stops = joined("stops", stops, cancel);
    let routes = joined("routes", routes, cancel);
    let route_shapes = joined("route_shapes", route_shapes, cancel);
    let vehicles = joined("vehicles", vehicles, cancel);

    if cancel.is_cancelled() {
        debug!("Aggregation abandoned");
        return None;
    }

    let snapshot = Snapshot {
        stops: stops?,
        routes: routes?,
        route_shapes: route_shapes?,
        vehicles: vehicles?,
    };
    let since = high_water_mark(0, &snapshot.vehicles);
    debug!(since, totals = ?snapshot.totals(), "Snapshot gathered");

    Some(Aggregated { snapshot, since })
}

fn spawn_fetch<T, F>(
    dataset: &'static str,
    fetch_timeout: Option<Duration>,
    cancel: &CancellationToken,
    fetch: F,
) -> JoinHandle<Option<T>>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let cancel = cancel.clone();
    tokio::spawn(
        async move {
            let result = match fetch_timeout {
                Some(limit) => tokio::time::timeout(limit, fetch)
                    .await
                    .unwrap_or_else(|_| Err(anyhow!("fetch timed out after {limit:?}"))),
                None => fetch.await,
            };
            match result {
                Ok(records) => Some(records),
                Err(e) => {
                    error!(dataset, error = %e, "Dataset fetch failed");
                    cancel.cancel();
                    None
                }
            }
        }
        .in_current_span(),
    )
}

fn joined<T>(
    dataset: &'static str,
    result: Result<Option<T>, tokio::task::JoinError>,
    cancel: &CancellationToken,
) -> Option<T> {
    result.unwrap_or_else(|e| {
        error!(dataset, error = %e, "Dataset fetch task panicked");
        cancel.cancel();
        None
    })
}
