//! Per-turret firing worker.

use tokio::sync::mpsc;

use barrage_transport::{BatteryClient, TransportError};
use barrage_types::{Coord, GunId, TurretId};

use crate::{EngineError, SharedGrid, TURRET_QUEUE_CAPACITY};

/// Physical guns per turret. Successive shots alternate between them to
/// balance barrel wear.
pub const GUNS_PER_TURRET: usize = 2;

/// Sequential firing loop for one turret.
///
/// The worker drains its queue strictly in order and runs one linear state
/// machine per shot: mark the tile fired, aim and load concurrently, fire,
/// report the coordinate to the observation channel. It never touches
/// another unit's queue or any cell other than the one in hand.
pub struct GunnerWorker {
    turret: TurretId,
    grid: SharedGrid,
    client: BatteryClient,
    queue: mpsc::Receiver<Coord>,
    observer: mpsc::Sender<Coord>,
    shots: usize,
}

impl GunnerWorker {
    /// Build a worker and the queue sender the dispatcher feeds it with.
    #[must_use]
    pub fn new(
        turret: TurretId,
        grid: SharedGrid,
        client: BatteryClient,
        observer: mpsc::Sender<Coord>,
    ) -> (mpsc::Sender<Coord>, Self) {
        let (tx, rx) = mpsc::channel(TURRET_QUEUE_CAPACITY);
        let worker = Self {
            turret,
            grid,
            client,
            queue: rx,
            observer,
            shots: 0,
        };
        (tx, worker)
    }

    /// Run until the queue closes (normal shutdown) or a shot fails for good.
    pub async fn run(mut self) -> Result<(), EngineError> {
        while let Some(coord) = self.queue.recv().await {
            self.engage(coord).await?;
        }
        Ok(())
    }

    /// One complete shot cycle for a claimed coordinate.
    async fn engage(&mut self, coord: Coord) -> Result<(), EngineError> {
        let gun = GunId::new(self.shots % GUNS_PER_TURRET);
        self.shots += 1;

        self.grid.mark_fired(coord);

        // Aiming and loading are independent; both must land before firing.
        let (aimed, loaded) = tokio::join!(
            self.client.target(self.turret, coord),
            self.client.load(self.turret, gun),
        );
        aimed.map_err(|source| self.shot_error(coord, source))?;
        loaded.map_err(|source| self.shot_error(coord, source))?;

        self.client
            .fire(self.turret, gun)
            .await
            .map_err(|source| self.shot_error(coord, source))?;
        tracing::debug!(turret = %self.turret, %gun, %coord, "shot away");

        // The observer dropping just means the match is tearing down.
        let _ = self.observer.send(coord).await;
        Ok(())
    }

    fn shot_error(&self, coord: Coord, source: TransportError) -> EngineError {
        EngineError::Shot {
            turret: self.turret,
            coord,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Grid;
    use barrage_transport::TransportConfig;
    use barrage_transport::retry::RetryConfig;
    use barrage_types::Tile;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> BatteryClient {
        let mut config = TransportConfig::with_base_url(server.uri());
        config.retry = RetryConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        };
        BatteryClient::new(&config).expect("client builds")
    }

    async fn mount_ok(server: &MockServer, route: &str) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "result": "ok" })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fires_and_reports_claimed_coordinate() {
        let server = MockServer::start().await;
        mount_ok(&server, "/target").await;
        mount_ok(&server, "/load").await;
        mount_ok(&server, "/fire").await;

        let grid = SharedGrid::new(Grid::new(8, 4));
        let (observer_tx, mut observer_rx) = mpsc::channel(4);
        let (queue, worker) =
            GunnerWorker::new(TurretId::new(0), grid.clone(), test_client(&server), observer_tx);
        let handle = tokio::spawn(worker.run());

        let coord = Coord::new(2, 1);
        assert!(grid.claim(coord));
        queue.send(coord).await.expect("queue open");

        assert_eq!(observer_rx.recv().await, Some(coord));
        assert_eq!(grid.tile(coord), Some(Tile::Check));

        drop(queue);
        handle
            .await
            .expect("worker joins")
            .expect("worker exits cleanly");
    }

    #[tokio::test]
    async fn alternates_guns_between_shots() {
        let server = MockServer::start().await;
        mount_ok(&server, "/target").await;

        for gun in 0..2 {
            Mock::given(method("POST"))
                .and(path("/load"))
                .and(body_json(serde_json::json!({ "turret": 1, "gun": gun })))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({ "result": "loaded" })),
                )
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/fire"))
                .and(body_json(serde_json::json!({ "turret": 1, "gun": gun })))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({ "result": "fired" })),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let grid = SharedGrid::new(Grid::new(8, 4));
        let (observer_tx, mut observer_rx) = mpsc::channel(4);
        let (queue, worker) =
            GunnerWorker::new(TurretId::new(1), grid.clone(), test_client(&server), observer_tx);
        let handle = tokio::spawn(worker.run());

        for coord in [Coord::new(0, 0), Coord::new(4, 0)] {
            grid.claim(coord);
            queue.send(coord).await.expect("queue open");
            assert_eq!(observer_rx.recv().await, Some(coord));
        }

        drop(queue);
        handle
            .await
            .expect("worker joins")
            .expect("worker exits cleanly");
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_shot_failure() {
        let server = MockServer::start().await;
        mount_ok(&server, "/target").await;
        mount_ok(&server, "/load").await;
        Mock::given(method("POST"))
            .and(path("/fire"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let grid = SharedGrid::new(Grid::new(8, 4));
        let (observer_tx, _observer_rx) = mpsc::channel(4);
        let (queue, worker) =
            GunnerWorker::new(TurretId::new(0), grid.clone(), test_client(&server), observer_tx);
        let handle = tokio::spawn(worker.run());

        let coord = Coord::new(3, 3);
        grid.claim(coord);
        queue.send(coord).await.expect("queue open");

        let error = handle
            .await
            .expect("worker joins")
            .expect_err("shot must fail");
        match error {
            EngineError::Shot {
                turret,
                coord: failed,
                ..
            } => {
                assert_eq!(turret, TurretId::new(0));
                assert_eq!(failed, coord);
            }
            other => panic!("expected Shot error, got {other}"),
        }
    }
}
