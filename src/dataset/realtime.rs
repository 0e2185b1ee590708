//! GTFS-Realtime vehicle position provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{ALL_RECORDS, VehicleDataset};
use crate::fetch::{HttpClient, load_source};
use crate::model::VehiclePosition;
use crate::parser::{parse_feed, vehicle_positions};

/// Feeds whose header is older than this are logged as stale.
const STALE_FEED_SECS: i64 = 300;

struct Cached {
    fetched_at: Instant,
    vehicles: Arc<Vec<VehiclePosition>>,
}

/// Polls a GTFS-RT vehicle positions feed.
///
/// Every live session refreshes on its own timer, so the decoded feed is
/// cached for `cache_ttl` and shared between callers. The cache lock is held
/// across the upstream fetch, which coalesces concurrent refreshes into one
/// request.
pub struct RealtimeVehicles {
    client: Box<dyn HttpClient>,
    source: String,
    route_types: HashMap<String, i32>,
    cache_ttl: Duration,
    cache: Mutex<Option<Cached>>,
}

impl RealtimeVehicles {
    pub fn new(
        client: Box<dyn HttpClient>,
        source: String,
        route_types: HashMap<String, i32>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            client,
            source,
            route_types,
            cache_ttl,
            cache: Mutex::new(None),
        }
    }

    async fn current(&self) -> Result<Arc<Vec<VehiclePosition>>> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                return Ok(cached.vehicles.clone());
            }
        }

        let bytes = load_source(self.client.as_ref(), &self.source).await?;
        let feed = parse_feed(&bytes)?;

        if let Some(ts) = feed.header.timestamp {
            let age_secs = Utc::now().timestamp() - ts as i64;
            if age_secs > STALE_FEED_SECS {
                warn!(age_secs, "Vehicle feed is stale");
            }
        }

        let vehicles = Arc::new(vehicle_positions(&feed, &self.route_types));
        debug!(vehicles = vehicles.len(), "Vehicle feed refreshed");

        *cache = Some(Cached {
            fetched_at: Instant::now(),
            vehicles: vehicles.clone(),
        });
        Ok(vehicles)
    }
}

#[async_trait]
impl VehicleDataset for RealtimeVehicles {
    async fn fetch_vehicle_positions(&self, since: u64) -> Result<Vec<VehiclePosition>> {
        let vehicles = self.current().await?;
        Ok(vehicles
            .iter()
            .filter(|v| since == ALL_RECORDS || v.timestamp > since)
            .cloned()
            .collect())
    }
}
