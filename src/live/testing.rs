//! Fakes shared by the live session unit tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::extract::ws::Message;
use geo::Point;
use futures::Sink;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender};
use serde_json::Value;

use super::aggregator::{Aggregated, Snapshot};
use crate::dataset::{RouteDataset, ShapeDataset, StaticNetwork, StopDataset, VehicleDataset};
use crate::model::{Route, RouteShape, Shape, Stop, StopWithDistance, VehiclePosition, high_water_mark};
use crate::spatial::BoundingBox;

pub fn vehicle(id: &str, timestamp: u64) -> VehiclePosition {
    VehiclePosition {
        vehicle_id: id.to_string(),
        lat: 45.5,
        lng: -122.6,
        timestamp,
        ..Default::default()
    }
}

fn collections(stops: usize, routes: usize, shapes: usize) -> (Vec<Stop>, Vec<Route>, Vec<RouteShape>) {
    (
        (0..stops)
            .map(|i| Stop {
                id: i.to_string(),
                ..Default::default()
            })
            .collect(),
        (0..routes)
            .map(|i| Route {
                id: format!("r{i}"),
                ..Default::default()
            })
            .collect(),
        (0..shapes)
            .map(|i| RouteShape {
                route_id: format!("r{i}"),
                ..Default::default()
            })
            .collect(),
    )
}

pub fn network(stops: usize, routes: usize, shapes: usize) -> StaticNetwork {
    let (stops, routes, shapes) = collections(stops, routes, shapes);
    StaticNetwork::new(stops, routes, shapes)
}

pub fn network_snapshot(
    stops: usize,
    routes: usize,
    shapes: usize,
    vehicles: Vec<VehiclePosition>,
) -> Aggregated {
    let (stops, routes, route_shapes) = collections(stops, routes, shapes);
    let since = high_water_mark(0, &vehicles);
    Aggregated {
        snapshot: Snapshot {
            stops,
            routes,
            route_shapes,
            vehicles,
        },
        since,
    }
}

/// Static datasets that always fail.
pub struct FailingStatic;

pub fn failing_static() -> FailingStatic {
    FailingStatic
}

#[async_trait]
impl StopDataset for FailingStatic {
    async fn fetch_all_stops(&self) -> Result<Vec<Stop>> {
        Err(anyhow!("stops unavailable"))
    }

    async fn fetch_within_distance(&self, _: Point, _: f64) -> Result<Vec<StopWithDistance>> {
        Err(anyhow!("stops unavailable"))
    }

    async fn fetch_within_box(&self, _: BoundingBox) -> Result<Vec<Stop>> {
        Err(anyhow!("stops unavailable"))
    }
}

#[async_trait]
impl RouteDataset for FailingStatic {
    async fn fetch_routes(&self) -> Result<Vec<Route>> {
        Err(anyhow!("routes unavailable"))
    }
}

#[async_trait]
impl ShapeDataset for FailingStatic {
    async fn fetch_route_shapes(&self) -> Result<Vec<RouteShape>> {
        Err(anyhow!("shapes unavailable"))
    }

    async fn fetch_shapes(&self, _: &[String], _: &[String]) -> Result<Vec<Shape>> {
        Err(anyhow!("shapes unavailable"))
    }
}

type Scripted = std::result::Result<Vec<VehiclePosition>, &'static str>;

/// Replays scripted responses; the last one repeats once the script runs out.
pub struct FakeVehicles {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    calls: Arc<Mutex<Vec<u64>>>,
    delay: Duration,
}

impl FakeVehicles {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The `since` argument of every fetch, in call order.
    pub fn calls(&self) -> Arc<Mutex<Vec<u64>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl VehicleDataset for FakeVehicles {
    async fn fetch_vehicle_positions(&self, since: u64) -> Result<Vec<VehiclePosition>> {
        self.calls.lock().unwrap().push(since);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        let response = match next {
            Some(response) => {
                *self.last.lock().unwrap() = Some(response.clone());
                response
            }
            None => self.last.lock().unwrap().clone().unwrap_or(Ok(Vec::new())),
        };
        response.map_err(|e| anyhow!(e))
    }
}

/// Collects frames written to an in-memory session sink.
pub struct Frames {
    rx: Option<UnboundedReceiver<Message>>,
}

impl Frames {
    pub fn new(rx: UnboundedReceiver<Message>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Drops the receiving end so every further write fails.
    pub fn disconnect(&mut self) {
        self.rx = None;
    }

    /// Every text frame received so far, parsed as JSON.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        if let Some(rx) = self.rx.as_mut() {
            while let Ok(Some(message)) = rx.try_next() {
                if let Message::Text(text) = message {
                    frames.push(serde_json::from_str(text.as_str()).unwrap());
                }
            }
        }
        frames
    }
}

/// Session sink that refuses frames of chosen kinds, or every frame once a
/// number of frames has gone through.
pub struct FlakySink {
    tx: UnboundedSender<Message>,
    rejected: Vec<&'static str>,
    remaining: Option<usize>,
}

impl FlakySink {
    pub fn new(tx: UnboundedSender<Message>) -> Self {
        Self {
            tx,
            rejected: Vec::new(),
            remaining: None,
        }
    }

    pub fn rejecting(mut self, kinds: &[&'static str]) -> Self {
        self.rejected = kinds.to_vec();
        self
    }

    pub fn broken_after(mut self, frames: usize) -> Self {
        self.remaining = Some(frames);
        self
    }

    fn kind(message: &Message) -> Option<String> {
        let Message::Text(text) = message else {
            return None;
        };
        let value: Value = serde_json::from_str(text.as_str()).ok()?;
        value["type"].as_str().map(str::to_string)
    }
}

impl Sink<Message> for FlakySink {
    type Error = String;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(mut self: Pin<&mut Self>, message: Message) -> Result<(), String> {
        if self.remaining == Some(0) {
            return Err("connection broken".to_string());
        }
        if let Some(kind) = Self::kind(&message) {
            if self.rejected.contains(&kind.as_str()) {
                return Err(format!("{kind} rejected"));
            }
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        self.tx.unbounded_send(message).map_err(|e| e.to_string())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
        Poll::Ready(Ok(()))
    }
}
