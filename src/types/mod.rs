//! Shared data structures for the MSI store and handler
//!
//! - `Position`: own-ship fix and area vertices (decimal degrees)
//! - `SafetyMessage`: a warning as received from the shore service
//! - `MessageView`: a message plus its per-message status, for presentation
//! - `Route`: planned route as seen by the relevance tests

mod message;
mod route;

pub use message::*;
pub use route::*;

use serde::{Deserialize, Serialize};

/// Geographic position in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude, self.longitude)
    }
}

impl std::str::FromStr for Position {
    type Err = String;

    /// Parses `"lat,lon"` as produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .trim()
            .split_once(',')
            .ok_or_else(|| format!("expected 'lat,lon', got '{s}'"))?;
        let latitude: f64 = lat
            .trim()
            .parse()
            .map_err(|e| format!("bad latitude '{lat}': {e}"))?;
        let longitude: f64 = lon
            .trim()
            .parse()
            .map_err(|e| format!("bad longitude '{lon}': {e}"))?;

        let pos = Self::new(latitude, longitude);
        if !pos.is_valid() {
            return Err(format!("position out of range: {s}"));
        }
        Ok(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        let pos: Position = "55.6761, 12.5683".parse().unwrap();
        assert!((pos.latitude - 55.6761).abs() < 1e-9);
        assert!((pos.longitude - 12.5683).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!("91.0,0.0".parse::<Position>().is_err());
        assert!("0.0,181.0".parse::<Position>().is_err());
        assert!("garbage".parse::<Position>().is_err());
    }
}
