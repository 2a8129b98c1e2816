//! Top-level match sequencing.
//!
//! The runner owns every task it spawns: two gunner workers, the scan
//! consumer, the transport's feed reader, and the shot observer. The whole
//! pipeline is cancelled as a unit once both phases complete and the final
//! score is collected.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};

use barrage_transport::BatteryClient;
use barrage_types::{Coord, Phase, Score, Theatre, TurretId};

use crate::dispatcher::{RoutingTable, TurretDispatcher};
use crate::grid::{Grid, SharedGrid};
use crate::gunner::GunnerWorker;
use crate::planner::phase_targets;
use crate::scan::ScanConsumer;
use crate::{EngineError, TURRET_COUNT};

const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(300);

const OBSERVER_CHANNEL_CAPACITY: usize = 64;

/// The advance channel holds at most one pending signal; the lap detector
/// blocks on a second one until the runner is listening again.
const ADVANCE_CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Name submitted with the registration handshake.
    pub player_name: String,
    /// Bound on how long a sweep phase may run without stabilizing. Expiry
    /// aborts the match; it is the backstop for a feed that stops lapping.
    pub phase_timeout: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            player_name: "barrage".to_string(),
            phase_timeout: DEFAULT_PHASE_TIMEOUT,
        }
    }
}

/// Run one full match: register, sweep both phases, collect the score.
pub async fn run_match(
    client: &BatteryClient,
    config: &MatchConfig,
) -> Result<Score, EngineError> {
    let theatre = client
        .register(&config.player_name)
        .await
        .map_err(EngineError::Registration)?;
    tracing::info!(
        width = theatre.grid_width,
        height = theatre.grid_height,
        ships = theatre.number_of_ships,
        "registered"
    );

    let mut run = MatchRun::start(client.clone(), &theatre);
    let swept = run.sweep_phases(config).await;
    let shots = run.shots_fired();
    let root_cause = run.shutdown().await;

    // A task failure is the root cause of any dispatch error it provoked.
    match (swept, root_cause) {
        (Ok(()), None) => {}
        (_, Some(error)) | (Err(error), None) => return Err(error),
    }

    let score = client.finish().await.map_err(EngineError::Finish)?;
    tracing::info!(%score, shots, "match finished");
    Ok(score)
}

/// The live pipeline for one match.
struct MatchRun {
    grid: SharedGrid,
    dispatcher: TurretDispatcher,
    advance: mpsc::Receiver<()>,
    /// Gunner workers and the scan consumer; anything here finishing while
    /// the match is still running is a fault.
    tasks: JoinSet<Result<(), EngineError>>,
    feed: JoinHandle<()>,
    observer: JoinHandle<()>,
    shots: Arc<AtomicUsize>,
}

impl MatchRun {
    fn start(client: BatteryClient, theatre: &Theatre) -> Self {
        let grid = SharedGrid::new(Grid::new(theatre.grid_width, theatre.grid_height));

        let shots = Arc::new(AtomicUsize::new(0));
        let (observer_tx, observer_rx) = mpsc::channel(OBSERVER_CHANNEL_CAPACITY);
        let observer = spawn_shot_observer(observer_rx, Arc::clone(&shots));

        let mut tasks = JoinSet::new();
        let mut queues = Vec::with_capacity(TURRET_COUNT);
        for turret in 0..TURRET_COUNT {
            let (queue, worker) = GunnerWorker::new(
                TurretId::new(turret),
                grid.clone(),
                client.clone(),
                observer_tx.clone(),
            );
            queues.push(queue);
            tasks.spawn(worker.run());
        }
        drop(observer_tx);

        let dispatcher = TurretDispatcher::new(
            grid.clone(),
            RoutingTable::hemispheres(theatre.grid_height),
            queues,
        );

        let (scan_events, feed) = client.subscribe_scanner();
        let (advance_tx, advance) = mpsc::channel(ADVANCE_CHANNEL_CAPACITY);
        tasks.spawn(
            ScanConsumer::new(grid.clone(), dispatcher.clone(), scan_events, advance_tx).run(),
        );

        Self {
            grid,
            dispatcher,
            advance,
            tasks,
            feed,
            observer,
            shots,
        }
    }

    async fn sweep_phases(&mut self, config: &MatchConfig) -> Result<(), EngineError> {
        let (width, height) = self.grid.dimensions();

        for phase in [Phase::One, Phase::Two] {
            let targets = phase_targets(width, height, phase);
            tracing::info!(%phase, targets = targets.len(), "sweep started");

            for coord in targets {
                self.dispatcher.dispatch(coord).await?;
            }

            self.await_phase_advance(phase, config.phase_timeout).await?;
            tracing::info!(
                %phase,
                unknown = self.grid.unknown_count(),
                "sweep complete"
            );
        }
        Ok(())
    }

    /// Block until the scan consumer signals stabilization, a pipeline task
    /// fails, or the phase timeout expires.
    async fn await_phase_advance(
        &mut self,
        phase: Phase,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let wait = tokio::time::timeout(timeout, async {
            tokio::select! {
                signal = self.advance.recv() => match signal {
                    Some(()) => Ok(()),
                    None => Err(EngineError::FeedClosed),
                },
                Some(result) = self.tasks.join_next() => Err(task_failure(result)),
            }
        })
        .await;

        match wait {
            Ok(result) => result,
            Err(_) => Err(EngineError::PhaseStalled { phase }),
        }
    }

    fn shots_fired(&self) -> usize {
        self.shots.load(Ordering::Relaxed)
    }

    /// Stop every task and harvest the first real failure, if any.
    async fn shutdown(mut self) -> Option<EngineError> {
        self.feed.abort();
        self.tasks.abort_all();
        self.observer.abort();

        let mut root_cause = None;
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(Err(error)) if root_cause.is_none() => root_cause = Some(error),
                Ok(_) => {}
                Err(join_error) if join_error.is_panic() && root_cause.is_none() => {
                    root_cause = Some(EngineError::TaskPanic(join_error.to_string()));
                }
                Err(_) => {}
            }
        }
        let _ = self.feed.await;
        let _ = self.observer.await;
        root_cause
    }
}

fn task_failure(result: Result<Result<(), EngineError>, JoinError>) -> EngineError {
    match result {
        Ok(Err(error)) => error,
        Ok(Ok(())) => EngineError::PipelineStopped,
        Err(join_error) => EngineError::TaskPanic(join_error.to_string()),
    }
}

fn spawn_shot_observer(
    mut fired: mpsc::Receiver<Coord>,
    shots: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(coord) = fired.recv().await {
            let total = shots.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(%coord, total, "shot observed");
        }
    })
}
