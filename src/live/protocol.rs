//! Outbound message envelope for the live channel.
//!
//! Every frame is a JSON text message shaped `{"type": ..., "data": ...}`.

use serde::{Deserialize, Serialize};

use crate::model::{Route, RouteShape, Stop, VehiclePosition};

/// Element counts of each collection in a session snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub stops: usize,
    pub routes: usize,
    pub route_shapes: usize,
    pub vehicles: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Envelope<'a> {
    Totals(Totals),
    Stops(&'a [Stop]),
    Routes(&'a [Route]),
    RouteShapes(&'a [RouteShape]),
    Vehicles(&'a [VehiclePosition]),
}

impl Envelope<'_> {
    /// The `type` tag this envelope is sent with.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Totals(_) => "totals",
            Envelope::Stops(_) => "stops",
            Envelope::Routes(_) => "routes",
            Envelope::RouteShapes(_) => "route_shapes",
            Envelope::Vehicles(_) => "vehicles",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_totals_shape() {
        let totals = Totals {
            stops: 250,
            routes: 5,
            route_shapes: 5,
            vehicles: 12,
        };
        let value: Value = serde_json::from_str(&Envelope::Totals(totals).to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "totals",
                "data": {"stops": 250, "routes": 5, "route_shapes": 5, "vehicles": 12}
            })
        );
    }

    #[test]
    fn test_collection_payload_is_array() {
        let shapes = vec![RouteShape {
            route_id: "90".to_string(),
            ..Default::default()
        }];
        let envelope = Envelope::RouteShapes(&shapes);
        let value: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], envelope.kind());
        assert_eq!(value["type"], "route_shapes");
        assert_eq!(value["data"][0]["route_id"], "90");
    }

    #[test]
    fn test_empty_collection() {
        let value: Value = serde_json::from_str(&Envelope::Vehicles(&[]).to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "vehicles", "data": []}));
    }
}
