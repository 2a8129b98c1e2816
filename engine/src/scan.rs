//! Scanner feed consumption: phase-lap detection and hit expansion.

use tokio::sync::mpsc;

use barrage_types::{Coord, ScanEvent, Tile};

use crate::{EngineError, SharedGrid, TurretDispatcher};

/// Detects sweep-phase completion from the feed alone.
///
/// The feed periodically re-reports the two sentinel corners; a sentinel
/// that differs from the previously recorded one marks a new pass over the
/// grid. When the number of Unknown tiles is unchanged between two
/// consecutive pass markers, no more shots or expansions are pending and
/// the phase has stabilized.
///
/// This is a stall heuristic, not a completion proof: it assumes the feed
/// laps the grid faster than the pipeline changes state. The runner's phase
/// timeout bounds the failure mode where lap markers stop arriving.
#[derive(Debug, Default)]
pub struct LapTracker {
    last_sentinel: Option<Coord>,
    last_unknown: Option<usize>,
}

impl LapTracker {
    /// Record a sentinel observation.
    ///
    /// Returns true when the unresolved count is unchanged since the
    /// previous lap. The first lap seeds the counter and never signals;
    /// a re-report of the same corner is not a new lap.
    pub fn observe_lap(&mut self, sentinel: Coord, unknown: usize) -> bool {
        if self.last_sentinel == Some(sentinel) {
            return false;
        }
        self.last_sentinel = Some(sentinel);

        match self.last_unknown {
            Some(previous) if previous == unknown => true,
            _ => {
                self.last_unknown = Some(unknown);
                false
            }
        }
    }
}

/// Sequentially applies feed events to the grid.
///
/// Each event is first checked as a lap marker, then classified: a tile
/// awaiting feedback goes Hot or Cold, and a fresh hit enqueues its
/// still-Unknown orthogonal neighbors through the dispatcher - the bounded
/// flood fill that grows the sparse checkerboard into full coverage of a
/// contiguous hit region.
pub struct ScanConsumer {
    grid: SharedGrid,
    dispatcher: TurretDispatcher,
    events: mpsc::Receiver<ScanEvent>,
    advance: mpsc::Sender<()>,
    laps: LapTracker,
}

impl ScanConsumer {
    #[must_use]
    pub fn new(
        grid: SharedGrid,
        dispatcher: TurretDispatcher,
        events: mpsc::Receiver<ScanEvent>,
        advance: mpsc::Sender<()>,
    ) -> Self {
        Self {
            grid,
            dispatcher,
            events,
            advance,
            laps: LapTracker::default(),
        }
    }

    /// Consume the feed until it closes.
    ///
    /// The transport only closes the event channel after exhausting its
    /// resubscribe budget, so running out of events mid-match is fatal;
    /// normal teardown aborts this task instead.
    pub async fn run(mut self) -> Result<(), EngineError> {
        while let Some(event) = self.events.recv().await {
            self.apply(event).await?;
        }
        Err(EngineError::FeedClosed)
    }

    async fn apply(&mut self, event: ScanEvent) -> Result<(), EngineError> {
        let coord = event.coord();
        if !self.grid.in_bounds(coord) {
            tracing::warn!(%coord, "scanner reported an out-of-bounds cell; dropping");
            return Ok(());
        }

        if self.grid.is_sentinel(coord) {
            let unknown = self.grid.unknown_count();
            if self.laps.observe_lap(coord, unknown) {
                tracing::info!(%coord, unknown, "sweep stabilized; signaling phase advance");
                // The runner dropping its receiver just means teardown has
                // already begun.
                let _ = self.advance.send(()).await;
            } else {
                tracing::debug!(%coord, unknown, "lap marker");
            }
        }

        if self.grid.resolve(coord, event.is_hit()) {
            if event.is_hit() {
                tracing::info!(%coord, thermal = event.thermal_index, "hit confirmed");
                self.expand(coord).await?;
            } else {
                tracing::debug!(%coord, "miss confirmed");
            }
        }
        // Tiles not awaiting classification ignore the event: late and
        // duplicate feedback is normal feed behavior.

        Ok(())
    }

    /// Enqueue the still-Unknown orthogonal neighbors of a confirmed hit.
    async fn expand(&mut self, coord: Coord) -> Result<(), EngineError> {
        for neighbor in self.grid.neighbors(coord) {
            if self.grid.tile(neighbor) == Some(Tile::Unknown) {
                self.dispatcher.dispatch(neighbor).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{RoutingTable, TURRET_QUEUE_CAPACITY};
    use crate::Grid;

    #[test]
    fn first_lap_seeds_without_signaling() {
        let mut laps = LapTracker::default();
        assert!(!laps.observe_lap(Coord::new(0, 0), 40));
    }

    #[test]
    fn unchanged_count_between_laps_signals() {
        let mut laps = LapTracker::default();

        assert!(!laps.observe_lap(Coord::new(0, 0), 40)); // seed
        assert!(laps.observe_lap(Coord::new(7, 3), 40)); // unchanged
    }

    #[test]
    fn changed_count_updates_instead_of_signaling() {
        let mut laps = LapTracker::default();

        assert!(!laps.observe_lap(Coord::new(0, 0), 40));
        assert!(!laps.observe_lap(Coord::new(7, 3), 33));
        assert!(!laps.observe_lap(Coord::new(0, 0), 30));
        assert!(laps.observe_lap(Coord::new(7, 3), 30));
    }

    #[test]
    fn same_sentinel_re_report_is_not_a_lap() {
        let mut laps = LapTracker::default();

        assert!(!laps.observe_lap(Coord::new(0, 0), 40));
        assert!(!laps.observe_lap(Coord::new(0, 0), 40));
        assert!(!laps.observe_lap(Coord::new(0, 0), 40));
        // A different corner with the same count still signals.
        assert!(laps.observe_lap(Coord::new(7, 3), 40));
    }

    struct Harness {
        grid: SharedGrid,
        events: mpsc::Sender<ScanEvent>,
        advance: mpsc::Receiver<()>,
        queues: Vec<mpsc::Receiver<Coord>>,
        handle: tokio::task::JoinHandle<Result<(), EngineError>>,
    }

    fn scan_event(x: u16, y: u16, thermal_index: f64) -> ScanEvent {
        ScanEvent {
            x,
            y,
            thermal_index,
        }
    }

    fn harness(width: u16, height: u16) -> Harness {
        let grid = SharedGrid::new(Grid::new(width, height));
        let (tx0, rx0) = mpsc::channel(TURRET_QUEUE_CAPACITY);
        let (tx1, rx1) = mpsc::channel(TURRET_QUEUE_CAPACITY);
        let dispatcher = TurretDispatcher::new(
            grid.clone(),
            RoutingTable::hemispheres(height),
            vec![tx0, tx1],
        );
        let (events_tx, events_rx) = mpsc::channel(16);
        let (advance_tx, advance_rx) = mpsc::channel(1);
        let consumer = ScanConsumer::new(grid.clone(), dispatcher, events_rx, advance_tx);
        let handle = tokio::spawn(consumer.run());
        Harness {
            grid,
            events: events_tx,
            advance: advance_rx,
            queues: vec![rx0, rx1],
            handle,
        }
    }

    fn drain_queued(queues: &mut [mpsc::Receiver<Coord>]) -> Vec<Coord> {
        let mut queued = Vec::new();
        for queue in queues {
            while let Ok(coord) = queue.try_recv() {
                queued.push(coord);
            }
        }
        queued.sort_unstable();
        queued
    }

    #[tokio::test]
    async fn hit_expands_to_unknown_neighbors_only() {
        let mut h = harness(8, 4);

        // (2,1) was fired at; its right neighbor is already resolved.
        h.grid.claim(Coord::new(2, 1));
        h.grid.mark_fired(Coord::new(2, 1));
        h.grid.claim(Coord::new(3, 1));
        h.grid.mark_fired(Coord::new(3, 1));
        h.grid.resolve(Coord::new(3, 1), false);

        h.events
            .send(scan_event(2, 1, 3.5))
            .await
            .expect("consumer alive");
        // A second, contradictory report for the same cell must be ignored.
        h.events
            .send(scan_event(2, 1, -1.0))
            .await
            .expect("consumer alive");

        drop(h.events);
        (&mut h.handle)
            .await
            .expect("consumer joins")
            .expect_err("feed closure is fatal");

        assert_eq!(h.grid.tile(Coord::new(2, 1)), Some(Tile::Hot));
        // (3,1) stays Cold; only the three Unknown neighbors were queued.
        assert_eq!(h.grid.tile(Coord::new(3, 1)), Some(Tile::Cold));
        assert_eq!(
            drain_queued(&mut h.queues),
            vec![Coord::new(1, 1), Coord::new(2, 0), Coord::new(2, 2)]
        );
    }

    #[tokio::test]
    async fn stale_feedback_changes_nothing() {
        let mut h = harness(8, 4);

        h.grid.claim(Coord::new(4, 2)); // Standby, never fired

        h.events
            .send(scan_event(4, 2, 9.0))
            .await
            .expect("consumer alive"); // Standby tile
        h.events
            .send(scan_event(5, 2, 9.0))
            .await
            .expect("consumer alive"); // Unknown tile
        h.events
            .send(scan_event(200, 200, 9.0))
            .await
            .expect("consumer alive"); // out of bounds

        drop(h.events);
        let _ = (&mut h.handle).await.expect("consumer joins");

        assert_eq!(h.grid.tile(Coord::new(4, 2)), Some(Tile::Standby));
        assert_eq!(h.grid.tile(Coord::new(5, 2)), Some(Tile::Unknown));
        assert!(drain_queued(&mut h.queues).is_empty());
    }

    #[tokio::test]
    async fn stabilized_sweep_signals_exactly_once() {
        let mut h = harness(8, 4);

        // Seed lap at (0,0), then a lap at the far corner with the same
        // unresolved count: one advance signal.
        h.events
            .send(scan_event(0, 0, -1.0))
            .await
            .expect("consumer alive");
        h.events
            .send(scan_event(7, 3, -1.0))
            .await
            .expect("consumer alive");

        assert_eq!(h.advance.recv().await, Some(()));

        // State changed before the next lap: no further signal.
        h.grid.claim(Coord::new(4, 0));
        h.events
            .send(scan_event(0, 0, -1.0))
            .await
            .expect("consumer alive");

        drop(h.events);
        let _ = h.handle.await.expect("consumer joins");
        assert!(h.advance.try_recv().is_err());
    }
}
