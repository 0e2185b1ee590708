//! Geographic helpers for stop searches.
//!
//! Points are `geo` points with `x = lng` and `y = lat`. Distances are
//! Haversine meters.

use geo::{Coord, HaversineDistance, Intersects, Point, Rect};

use crate::model::Stop;

/// Haversine distance between two points in meters.
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    p1.haversine_distance(&p2)
}

pub fn stop_point(stop: &Stop) -> Point {
    Point::new(stop.lng, stop.lat)
}

/// A lat/lng box given by its four edges. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    rect: Rect,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            rect: Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north }),
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        self.rect.intersects(&point.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        // Pioneer Courthouse Square to the Rose Quarter is roughly 1.7 km.
        let pioneer = Point::new(-122.6793, 45.5189);
        let rose_quarter = Point::new(-122.6668, 45.5316);

        let dist = haversine_distance(pioneer, rose_quarter);
        assert!((dist - 1_700.0).abs() < 200.0, "dist={dist}");
        assert_eq!(haversine_distance(pioneer, pioneer), 0.0);
    }

    #[test]
    fn test_box_edges_are_inclusive() {
        let bounds = BoundingBox::new(-122.7, 45.5, -122.6, 45.6);
        assert!(bounds.contains(Point::new(-122.65, 45.55)));
        assert!(bounds.contains(Point::new(-122.7, 45.5)));
        assert!(!bounds.contains(Point::new(-122.8, 45.55)));
        assert!(!bounds.contains(Point::new(-122.65, 45.61)));
    }

    #[test]
    fn test_stop_point_uses_lng_as_x() {
        let stop = Stop {
            lat: 45.5,
            lng: -122.6,
            ..Default::default()
        };
        let point = stop_point(&stop);
        assert_eq!(point.x(), -122.6);
        assert_eq!(point.y(), 45.5);
    }
}
