//! Coordination core for the barrage targeting engine.
//!
//! # Architecture
//!
//! One task per actor, communicating over bounded channels:
//!
//! ```text
//! phase_targets() ──> TurretDispatcher ──> GunnerWorker (one per turret)
//!                          ^                     │ fired coords
//!                          │ expansion           v
//!                     ScanConsumer <── feed   shot observer
//!                          │
//!                          └── phase-advance ──> match runner
//! ```
//!
//! The [`Grid`] is the one piece of state touched by more than one actor;
//! it lives behind a mutex held only for single read-modify-write steps
//! ([`SharedGrid`]). Everything else is message passing: the dispatcher
//! claims a tile before enqueuing it, so no coordinate can ever reach two
//! workers, and a full queue blocks the dispatcher rather than dropping
//! the target.
//!
//! The scan consumer drives both adaptive expansion (neighbors of confirmed
//! hits are fed back through the dispatcher) and phase completion (sentinel
//! lap markers with an unchanged unresolved count).

mod dispatcher;
mod grid;
mod gunner;
mod planner;
mod runner;
mod scan;

pub use dispatcher::{RoutingTable, TURRET_QUEUE_CAPACITY, TurretDispatcher};
pub use grid::{Grid, SharedGrid};
pub use gunner::{GUNS_PER_TURRET, GunnerWorker};
pub use planner::phase_targets;
pub use runner::{MatchConfig, run_match};
pub use scan::{LapTracker, ScanConsumer};

use barrage_transport::TransportError;
use barrage_types::{Coord, Phase, TurretId};

/// Number of independent firing units.
pub const TURRET_COUNT: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("registration failed: {0}")]
    Registration(#[source] TransportError),
    #[error("turret {turret} shot at {coord} failed: {source}")]
    Shot {
        turret: TurretId,
        coord: Coord,
        #[source]
        source: TransportError,
    },
    #[error("turret {0} queue closed while dispatching")]
    QueueClosed(TurretId),
    #[error("scanner feed closed before the match completed")]
    FeedClosed,
    #[error("{phase} never stabilized before the phase timeout")]
    PhaseStalled { phase: Phase },
    #[error("a pipeline task stopped while the match was still running")]
    PipelineStopped,
    #[error("pipeline task panicked: {0}")]
    TaskPanic(String),
    #[error("finish failed: {0}")]
    Finish(#[source] TransportError),
}
