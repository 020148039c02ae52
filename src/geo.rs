//! Geographic relevance helpers
//!
//! Pure functions used by the store to decide whether a warning is near own
//! ship (great-circle distance) or near a route (bounding box approximation).
//! Distances are in nautical miles, the unit of the relevance radius.

use crate::types::{Position, Route};

/// Mean earth radius in nautical miles
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Great-circle (haversine) distance between two positions in nautical miles.
pub fn distance_nm(a: &Position, b: &Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_NM * h.sqrt().min(1.0).asin()
}

/// Smallest distance from `from` to any of `points`, or `None` for an empty slice.
pub fn min_distance_nm(from: &Position, points: &[Position]) -> Option<f64> {
    points
        .iter()
        .map(|p| distance_nm(from, p))
        .min_by(f64::total_cmp)
}

/// Whether any of `points` lies within `radius_nm` of `from` (boundary inclusive).
pub fn within_radius(from: &Position, points: &[Position], radius_nm: f64) -> bool {
    min_distance_nm(from, points).is_some_and(|d| d <= radius_nm)
}

/// Axis-aligned latitude/longitude rectangle.
///
/// Does not handle routes that cross the antimeridian; such a route yields a
/// box spanning the whole longitude range between its extremes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Box spanning the extreme latitudes and longitudes of `points`.
    pub fn from_points(points: &[Position]) -> Option<Self> {
        let first = points.first()?;
        let init = Self {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lon: first.longitude,
            max_lon: first.longitude,
        };
        Some(points.iter().skip(1).fold(init, |b, p| Self {
            min_lat: b.min_lat.min(p.latitude),
            max_lat: b.max_lat.max(p.latitude),
            min_lon: b.min_lon.min(p.longitude),
            max_lon: b.max_lon.max(p.longitude),
        }))
    }

    /// Box around a route's waypoints; `None` for a route without waypoints.
    pub fn of_route(route: &Route) -> Option<Self> {
        Self::from_points(&route.waypoints)
    }

    pub fn contains(&self, p: &Position) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.latitude)
            && (self.min_lon..=self.max_lon).contains(&p.longitude)
    }

    pub fn contains_any(&self, points: &[Position]) -> bool {
        points.iter().any(|p| self.contains(p))
    }
}

/// Bounding boxes of the routes currently displayed.
pub fn visible_route_boxes(routes: &[Route]) -> Vec<BoundingBox> {
    routes
        .iter()
        .filter(|r| r.visible)
        .filter_map(BoundingBox::of_route)
        .collect()
}
