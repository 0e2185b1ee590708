//! HTTP surface: the live WebSocket endpoint plus plain JSON queries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use futures::StreamExt;
use geo::Point;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::LiveConfig;
use crate::dataset::{ALL_RECORDS, Datasets};
use crate::live::{Session, SessionOptions};
use crate::model::{Route, RouteShape, Shape, StopWithDistance, VehiclePosition};
use crate::spatial::BoundingBox;
use crate::tracker::ConnectionTracker;

#[derive(Clone)]
pub struct AppState {
    datasets: Datasets,
    config: Arc<LiveConfig>,
    tracker: ConnectionTracker,
    shutdown: CancellationToken,
    next_session: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(datasets: Datasets, config: LiveConfig) -> Self {
        Self {
            datasets,
            config: Arc::new(config),
            tracker: ConnectionTracker::default(),
            shutdown: CancellationToken::new(),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Cancelling this token stops the server and every live session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ws", get(live_updates))
        .route("/api/v1/stops", get(stops))
        .route("/api/v1/routes", get(routes))
        .route("/api/v1/route_shapes", get(route_shapes))
        .route("/api/v1/shapes", get(shapes))
        .route("/api/v1/vehicles", get(vehicles))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until the state's shutdown token is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let shutdown = state.shutdown_token();
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Cancels `shutdown` once `signal` fires. If the signal cannot be listened
/// for, the error is logged and the server keeps running.
pub async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Shutdown requested");
            shutdown.cancel();
        }
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

async fn health() -> &'static str {
    "OK"
}

/// Upgrades to the live channel. Options are validated before the handshake,
/// so a malformed query never creates a session.
async fn live_updates(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let options = match SessionOptions::from_query(&params) {
        Ok(options) => options,
        Err(e) => {
            info!(error = %e, "Rejected live connection");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let id = state.next_session.fetch_add(1, Ordering::Relaxed);
    upgrade.on_upgrade(move |socket| async move {
        let _connection = state.tracker.connect();
        let session = Session::new(
            id,
            options,
            state.config.clone(),
            state.datasets.clone(),
            state.shutdown.child_token(),
        );
        let (sink, stream) = socket.split();
        session.run(sink, stream).await;
    })
}

/// A failed query. Internal errors are logged and not echoed to clients.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = %e, "Dataset query failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

#[derive(Serialize)]
struct StopsResponse {
    stops: Vec<StopWithDistance>,
}

/// A non-empty query value parsed as a finite coordinate or distance.
fn float_param(params: &HashMap<String, String>, name: &str) -> Result<Option<f64>, ApiError> {
    let Some(raw) = params.get(name).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        Ok(_) => Err(ApiError::bad_request(format!("error parsing {name}: not a finite number"))),
        Err(e) => Err(ApiError::bad_request(format!("error parsing {name}: {e}"))),
    }
}

/// All stops, or a search: `south`/`north`/`east`/`west` selects a box and
/// takes precedence over `lat`/`lng`/`distance` (meters). A search only
/// applies when all of its parameters are given.
async fn stops(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<StopsResponse>, ApiError> {
    let edges = (
        float_param(&params, "west")?,
        float_param(&params, "south")?,
        float_param(&params, "east")?,
        float_param(&params, "north")?,
    );
    let around = (
        float_param(&params, "lat")?,
        float_param(&params, "lng")?,
        float_param(&params, "distance")?,
    );

    let dataset = &state.datasets.stops;
    let stops = match (edges, around) {
        ((Some(west), Some(south), Some(east), Some(north)), _) => dataset
            .fetch_within_box(BoundingBox::new(west, south, east, north))
            .await?
            .into_iter()
            .map(StopWithDistance::from)
            .collect(),
        (_, (Some(lat), Some(lng), Some(distance))) => {
            if distance < 0.0 {
                return Err(ApiError::bad_request("distance must not be negative"));
            }
            dataset
                .fetch_within_distance(Point::new(lng, lat), distance)
                .await?
        }
        _ => dataset
            .fetch_all_stops()
            .await?
            .into_iter()
            .map(StopWithDistance::from)
            .collect(),
    };
    Ok(Json(StopsResponse { stops }))
}

/// Comma separated ids; empty entries are ignored.
fn id_list(params: &HashMap<String, String>, name: &str) -> Vec<String> {
    params
        .get(name)
        .map(|raw| {
            raw.split(',')
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

async fn shapes(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Shape>>, ApiError> {
    let route_ids = id_list(&params, "route_ids");
    let shape_ids = id_list(&params, "shape_ids");
    if route_ids.is_empty() && shape_ids.is_empty() {
        return Err(ApiError::bad_request("must specify route_ids or shape_ids"));
    }
    Ok(Json(
        state
            .datasets
            .shapes
            .fetch_shapes(&route_ids, &shape_ids)
            .await?,
    ))
}

async fn routes(State(state): State<AppState>) -> Result<Json<Vec<Route>>, ApiError> {
    Ok(Json(state.datasets.routes.fetch_routes().await?))
}

async fn route_shapes(State(state): State<AppState>) -> Result<Json<Vec<RouteShape>>, ApiError> {
    Ok(Json(state.datasets.shapes.fetch_route_shapes().await?))
}

async fn vehicles(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<VehiclePosition>>, ApiError> {
    let since = match params.get("since").filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse()
            .map_err(|e| ApiError::bad_request(format!("error parsing since: {e}")))?,
        None => ALL_RECORDS,
    };
    Ok(Json(
        state.datasets.vehicles.fetch_vehicle_positions(since).await?,
    ))
}
