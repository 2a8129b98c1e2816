//! Wire types for the battery service API.
//!
//! Field names follow the service's JSON contract (camelCase), so every
//! type here pins `rename_all` rather than relying on struct field names
//! staying in sync with the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Coord, GunId, TurretId};

/// One-time registration request establishing a match.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
}

/// Registration handshake response: grid dimensions plus the ship roster.
///
/// The roster is carried for reporting only; targeting never consumes it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theatre {
    pub grid_width: u16,
    pub grid_height: u16,
    #[serde(default)]
    pub number_of_ships: u32,
    #[serde(default)]
    pub ships: Vec<Ship>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ship {
    pub descriptor: String,
    pub width: u16,
    pub length: u16,
}

/// Aim a turret at a coordinate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    pub x: u16,
    pub y: u16,
    pub turret: TurretId,
}

impl TargetRequest {
    #[must_use]
    pub fn new(turret: TurretId, coord: Coord) -> Self {
        Self {
            x: coord.x,
            y: coord.y,
            turret,
        }
    }
}

/// Load or fire a specific gun on a turret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GunRequest {
    pub turret: TurretId,
    pub gun: GunId,
}

/// Acknowledgement returned by target/load/fire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    #[serde(default)]
    pub result: String,
}

/// End-of-match report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub score: i64,
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.score)
    }
}

/// External feedback record from the scanner feed.
///
/// `thermal_index > 0` means the scanned cell holds a hit.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub x: u16,
    pub y: u16,
    pub thermal_index: f64,
}

impl ScanEvent {
    #[must_use]
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }

    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.thermal_index > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_event_uses_wire_field_names() {
        let event: ScanEvent =
            serde_json::from_str(r#"{"x": 2, "y": 1, "thermalIndex": 3.5}"#).expect("valid frame");
        assert_eq!(event.coord(), Coord::new(2, 1));
        assert!(event.is_hit());

        let miss: ScanEvent =
            serde_json::from_str(r#"{"x": 0, "y": 0, "thermalIndex": -1.0}"#).expect("valid frame");
        assert!(!miss.is_hit());
    }

    #[test]
    fn theatre_tolerates_missing_roster() {
        let theatre: Theatre =
            serde_json::from_str(r#"{"gridWidth": 24, "gridHeight": 16}"#).expect("valid handshake");
        assert_eq!(theatre.grid_width, 24);
        assert_eq!(theatre.grid_height, 16);
        assert!(theatre.ships.is_empty());
    }

    #[test]
    fn target_request_serializes_turret_index() {
        let body = serde_json::to_value(TargetRequest::new(TurretId::new(1), Coord::new(5, 3)))
            .expect("serializable");
        assert_eq!(body["x"], 5);
        assert_eq!(body["y"], 3);
        assert_eq!(body["turret"], 1);
    }
}
