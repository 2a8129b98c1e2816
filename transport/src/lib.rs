//! HTTP client for the battery service.
//!
//! # Architecture
//!
//! The crate wraps the service's two surfaces:
//!
//! - [`BatteryClient`] - request/response calls (`register`, `target`, `load`,
//!   `fire`, `finish`), each sent through the bounded-retry policy in [`retry`]
//! - [`BatteryClient::subscribe_scanner`] - the streaming scanner feed,
//!   decoded into [`ScanEvent`] values and delivered over a bounded channel
//!
//! The coordination core never sees HTTP: it receives typed responses and a
//! receiver of already-decoded events, so routing metadata and payload
//! encoding are resolved entirely at this boundary.
//!
//! # Error Handling
//!
//! Per-call failures surface as [`TransportError`] after retries exhaust.
//! Feed failures are handled internally: malformed frames are dropped with a
//! warning, lost connections are resubscribed a bounded number of times, and
//! only permanent feed loss is surfaced - by closing the event channel.

mod config;
mod feed;
pub mod retry;

pub use config::TransportConfig;
pub use feed::SCAN_CHANNEL_CAPACITY;

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use barrage_types::{
    ActionResult, Coord, GunId, GunRequest, Registration, Score, TargetRequest, Theatre, TurretId,
};

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};

const MAX_ERROR_BODY_BYTES: usize = 2 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{action} rejected with HTTP {status}: {body}")]
    Http {
        action: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("{action} failed after {attempts} attempts: {source}")]
    Connect {
        action: &'static str,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("{action} returned an undecodable body: {source}")]
    Decode {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("scanner stream interrupted: {source}")]
    Stream {
        #[source]
        source: reqwest::Error,
    },
    #[error("scanner stream idle for {idle:?}")]
    StreamIdle { idle: Duration },
    #[error("scanner frame exceeded {limit} bytes without a delimiter")]
    FrameOverflow { limit: usize },
}

/// Client for the battery service.
///
/// Cheap to clone: clones share the underlying connection pool.
///
/// The shared client carries only a connect timeout; the per-request total
/// timeout is applied to the unary calls and deliberately not to the
/// scanner subscription, which is a single response that lives for the
/// whole match.
#[derive(Debug, Clone)]
pub struct BatteryClient {
    http: reqwest::Client,
    base: String,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl BatteryClient {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            http,
            base: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            retry: config.retry.clone(),
        })
    }

    /// One-time registration handshake establishing the grid dimensions.
    pub async fn register(&self, name: &str) -> Result<Theatre, TransportError> {
        let body = Registration {
            name: name.to_string(),
        };
        self.post_json("register", &body).await
    }

    /// Aim a turret at a coordinate.
    pub async fn target(
        &self,
        turret: TurretId,
        coord: Coord,
    ) -> Result<ActionResult, TransportError> {
        self.post_json("target", &TargetRequest::new(turret, coord))
            .await
    }

    /// Load a specific gun on a turret.
    pub async fn load(&self, turret: TurretId, gun: GunId) -> Result<ActionResult, TransportError> {
        self.post_json("load", &GunRequest { turret, gun }).await
    }

    /// Fire a loaded gun.
    pub async fn fire(&self, turret: TurretId, gun: GunId) -> Result<ActionResult, TransportError> {
        self.post_json("fire", &GunRequest { turret, gun }).await
    }

    /// End the match and collect the score. Called once, after both phases.
    pub async fn finish(&self) -> Result<Score, TransportError> {
        let url = self.endpoint("finish");
        let outcome = send_with_retry(
            || self.http.get(&url).timeout(self.request_timeout),
            &self.retry,
        )
        .await;
        Self::decode("finish", outcome).await
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn post_json<B, T>(&self, action: &'static str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = self.endpoint(action);
        let outcome = send_with_retry(
            || self.http.post(&url).json(body).timeout(self.request_timeout),
            &self.retry,
        )
        .await;
        Self::decode(action, outcome).await
    }

    async fn decode<T>(action: &'static str, outcome: RetryOutcome) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        match outcome {
            RetryOutcome::Success(response) => response
                .json()
                .await
                .map_err(|source| TransportError::Decode { action, source }),
            RetryOutcome::HttpError(response) => {
                let status = response.status();
                let body = truncated_body(response).await;
                Err(TransportError::Http {
                    action,
                    status,
                    body,
                })
            }
            RetryOutcome::ConnectionError { attempts, source } => Err(TransportError::Connect {
                action,
                attempts,
                source,
            }),
        }
    }
}

/// Read an error response body, capped so a misbehaving server cannot bloat
/// logs or error chains.
pub(crate) async fn truncated_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) if text.len() > MAX_ERROR_BODY_BYTES => {
            let mut end = MAX_ERROR_BODY_BYTES;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &text[..end])
        }
        Ok(text) => text,
        Err(_) => "<unreadable body>".to_string(),
    }
}
