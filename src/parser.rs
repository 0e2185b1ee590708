//! Protobuf parser for GTFS Realtime vehicle position feeds.

use std::collections::HashMap;

use anyhow::Result;
use prost::Message;

use crate::gtfs_rt::FeedMessage;
use crate::model::VehiclePosition;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Flattens the vehicle entities of a feed into [`VehiclePosition`] records.
///
/// Entities without a position or flagged deleted are dropped. A vehicle with
/// no timestamp of its own inherits the feed header timestamp. `route_types`
/// supplies the GTFS route type for each route id.
pub fn vehicle_positions(
    feed: &FeedMessage,
    route_types: &HashMap<String, i32>,
) -> Vec<VehiclePosition> {
    let header_timestamp = feed.header.timestamp.unwrap_or_default();

    feed.entity
        .iter()
        .filter(|e| !e.is_deleted.unwrap_or(false))
        .filter_map(|e| {
            let v = e.vehicle.as_ref()?;
            let pos = v.position.as_ref()?;
            let trip = v.trip.as_ref();
            let route_id = trip.and_then(|t| t.route_id.clone());

            Some(VehiclePosition {
                vehicle_id: v
                    .vehicle
                    .as_ref()
                    .and_then(|d| d.id.clone())
                    .unwrap_or_else(|| e.id.clone()),
                trip_id: trip.and_then(|t| t.trip_id.clone()),
                route_type: route_id
                    .as_ref()
                    .and_then(|id| route_types.get(id).copied()),
                route_id,
                lat: f64::from(pos.latitude),
                lng: f64::from(pos.longitude),
                bearing: pos.bearing,
                speed: pos.speed,
                timestamp: v.timestamp.unwrap_or(header_timestamp),
            })
        })
        .collect()
}
