//! Turret routing and target dispatch.

use std::ops::Range;

use tokio::sync::mpsc;

use barrage_types::{Coord, TurretId};

use crate::{EngineError, SharedGrid};

/// Capacity of each gunner queue. A full queue blocks the dispatcher
/// (back-pressure) rather than dropping the coordinate.
pub const TURRET_QUEUE_CAPACITY: usize = 10;

/// Static routing table mapping row ranges to firing units.
///
/// The split is fixed configuration, not a load balancer; keeping it a
/// table rather than an inline conditional lets tests exercise other
/// splits and unit counts.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

#[derive(Debug, Clone)]
struct RouteEntry {
    rows: Range<u16>,
    unit: TurretId,
}

impl RoutingTable {
    /// The standard hemisphere split: rows below or on the equator
    /// (y <= height / 2) go to unit 1, rows above it to unit 0.
    #[must_use]
    pub fn hemispheres(height: u16) -> Self {
        let equator = height / 2;
        Self::from_entries(vec![
            (0..equator + 1, TurretId::new(1)),
            (equator + 1..height, TurretId::new(0)),
        ])
    }

    #[must_use]
    pub fn from_entries(entries: Vec<(Range<u16>, TurretId)>) -> Self {
        assert!(!entries.is_empty(), "routing table must have entries");
        Self {
            entries: entries
                .into_iter()
                .map(|(rows, unit)| RouteEntry { rows, unit })
                .collect(),
        }
    }

    /// Highest unit index the table routes to.
    #[must_use]
    pub fn max_unit(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.unit.value())
            .max()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn unit_for(&self, coord: Coord) -> TurretId {
        for entry in &self.entries {
            if entry.rows.contains(&coord.y) {
                return entry.unit;
            }
        }
        debug_assert!(false, "no route for {coord}");
        self.entries[0].unit
    }
}

/// Routes candidate coordinates to gunner queues.
///
/// The tile is claimed (`Unknown → Standby`) before it is enqueued, under
/// the grid lock, which closes the race where the same coordinate could
/// reach two workers. Anything not currently Unknown is rejected.
#[derive(Clone)]
pub struct TurretDispatcher {
    grid: SharedGrid,
    routes: RoutingTable,
    queues: Vec<mpsc::Sender<Coord>>,
}

impl TurretDispatcher {
    #[must_use]
    pub fn new(grid: SharedGrid, routes: RoutingTable, queues: Vec<mpsc::Sender<Coord>>) -> Self {
        assert!(
            routes.max_unit() < queues.len(),
            "routing table references unit {} but only {} queues exist",
            routes.max_unit(),
            queues.len()
        );
        Self {
            grid,
            routes,
            queues,
        }
    }

    /// Claim a candidate and hand it to its firing unit.
    ///
    /// Returns whether the coordinate was accepted; a losing claim (already
    /// queued, fired, or resolved) is not an error. Blocks when the routed
    /// queue is full.
    pub async fn dispatch(&self, coord: Coord) -> Result<bool, EngineError> {
        if !self.grid.claim(coord) {
            return Ok(false);
        }

        let unit = self.routes.unit_for(coord);
        self.queues[unit.value()]
            .send(coord)
            .await
            .map_err(|_| EngineError::QueueClosed(unit))?;
        tracing::debug!(%coord, %unit, "target queued");
        Ok(true)
    }
}
