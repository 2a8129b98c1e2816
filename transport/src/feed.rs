//! Scanner feed subscription.
//!
//! The feed is a long-lived streaming response of newline-delimited JSON
//! [`ScanEvent`] frames. Decoded events are forwarded over a bounded channel;
//! the reader task owns the connection and its resubscribe policy:
//!
//! - a malformed frame is dropped with a warning, the stream continues
//! - a lost or closed connection is resubscribed with backoff, up to
//!   [`MAX_RESUBSCRIBES`] consecutive failures
//! - permanent loss is signalled by closing the event channel
//! - the receiver side closing shuts the reader down
//!
//! Events arrive in feed order, which has no relation to request order;
//! consumers must tolerate reports for cells they have not fired at.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use barrage_types::ScanEvent;

use crate::retry::calculate_retry_delay;
use crate::{BatteryClient, TransportError};

/// Capacity of the decoded-event channel. A slow consumer back-pressures
/// the reader rather than dropping feedback.
pub const SCAN_CHANNEL_CAPACITY: usize = 256;

/// Consecutive failed subscriptions tolerated before the feed is declared lost.
const MAX_RESUBSCRIBES: u32 = 5;

/// A healthy feed reports continuously; silence this long means the
/// connection is dead and worth re-establishing.
const FEED_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

const MAX_FRAME_BYTES: usize = 64 * 1024;

enum FeedDisconnect {
    /// Server ended the stream; `delivered` frames were forwarded first.
    ServerClosed { delivered: usize },
    /// Receiver side dropped; the subscription is no longer wanted.
    ChannelClosed,
}

impl BatteryClient {
    /// Subscribe to the scanner feed.
    ///
    /// Returns the decoded-event receiver and the reader task's handle. The
    /// channel closing before the handle finishes means the feed was lost
    /// for good; aborting the handle is the normal end-of-match teardown.
    #[must_use]
    pub fn subscribe_scanner(&self) -> (mpsc::Receiver<ScanEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let client = self.clone();
        let handle = tokio::spawn(async move { client.scanner_loop(tx).await });
        (rx, handle)
    }

    async fn scanner_loop(self, events: mpsc::Sender<ScanEvent>) {
        let mut failures: u32 = 0;
        loop {
            match self.stream_scanner(&events).await {
                Ok(FeedDisconnect::ChannelClosed) => return,
                Ok(FeedDisconnect::ServerClosed { delivered }) => {
                    if delivered > 0 {
                        failures = 0;
                    }
                    tracing::warn!(delivered, "scanner stream closed by server");
                }
                Err(error) => {
                    tracing::warn!(%error, "scanner stream failed");
                }
            }

            failures += 1;
            if failures > MAX_RESUBSCRIBES {
                tracing::error!(
                    resubscribes = MAX_RESUBSCRIBES,
                    "scanner feed lost; giving up"
                );
                return;
            }

            let delay = calculate_retry_delay(failures - 1, self.retry_config());
            tracing::debug!(delay_ms = delay.as_millis(), "resubscribing to scanner feed");
            tokio::time::sleep(delay).await;
        }
    }

    /// Run one subscription to completion, forwarding decoded frames.
    async fn stream_scanner(
        &self,
        events: &mpsc::Sender<ScanEvent>,
    ) -> Result<FeedDisconnect, TransportError> {
        let url = self.endpoint("scanner");
        let response = self
            .http()
            .get(&url)
            .send()
            .await
            .map_err(|source| TransportError::Connect {
                action: "scanner subscribe",
                attempts: 1,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                action: "scanner subscribe",
                status,
                body: crate::truncated_body(response).await,
            });
        }
        tracing::debug!(%url, "scanner feed subscribed");

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut delivered = 0usize;

        loop {
            let Ok(next) = tokio::time::timeout(FEED_IDLE_TIMEOUT, stream.next()).await else {
                return Err(TransportError::StreamIdle {
                    idle: FEED_IDLE_TIMEOUT,
                });
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|source| TransportError::Stream { source })?;
            buffer.extend_from_slice(&chunk);

            while let Some(frame) = drain_next_frame(&mut buffer) {
                if !forward_frame(&frame, events, &mut delivered).await {
                    return Ok(FeedDisconnect::ChannelClosed);
                }
            }

            if buffer.len() > MAX_FRAME_BYTES {
                return Err(TransportError::FrameOverflow {
                    limit: MAX_FRAME_BYTES,
                });
            }
        }

        // Flush a final frame the server did not terminate with a newline.
        if !buffer.is_empty() && !forward_frame(&buffer, events, &mut delivered).await {
            return Ok(FeedDisconnect::ChannelClosed);
        }

        Ok(FeedDisconnect::ServerClosed { delivered })
    }
}

/// Decode and forward one frame. Returns false when the receiver is gone.
async fn forward_frame(
    frame: &[u8],
    events: &mpsc::Sender<ScanEvent>,
    delivered: &mut usize,
) -> bool {
    if frame.is_empty() {
        return true;
    }
    match serde_json::from_slice::<ScanEvent>(frame) {
        Ok(event) => {
            if events.send(event).await.is_err() {
                return false;
            }
            *delivered += 1;
            true
        }
        Err(error) => {
            tracing::warn!(%error, "dropping malformed scanner frame");
            true
        }
    }
}

/// Pop the next newline-delimited frame off the buffer, stripping the
/// delimiter (and a CR, for CRLF streams).
fn drain_next_frame(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buffer.iter().position(|&b| b == b'\n')?;
    let mut frame: Vec<u8> = buffer.drain(..=pos).collect();
    frame.pop();
    if frame.last() == Some(&b'\r') {
        frame.pop();
    }
    Some(frame)
}
