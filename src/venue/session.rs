//! Session Manager - owns the venue transport connection
//!
//! One task per engine: connects, authorizes, stamps every outbound payload
//! with a strictly increasing `req_id`, and forwards parsed frames to the
//! engine. Reconnects with bounded exponential backoff + jitter; an explicit
//! shutdown (stop-all/panic) ends the task without reconnecting.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as TungsteniteMessage};
use tracing::{debug, error, info, warn};

use super::types::{parse_frame, OutboundRequest};
use super::VenueEvent;

const BASE_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;
const BACKOFF_JITTER_RATIO: f64 = 0.20;

fn backoff_with_jitter_secs(attempt: u32) -> u64 {
    let capped_attempt = attempt.min(16);
    let base = BASE_BACKOFF_SECS.saturating_mul(1u64 << capped_attempt);
    let bounded = base.min(MAX_BACKOFF_SECS).max(1);

    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_micros() as f64;
    let unit = (micros % 1_000.0) / 1_000.0;
    let jitter = 1.0 + ((unit * 2.0) - 1.0) * BACKOFF_JITTER_RATIO;
    ((bounded as f64) * jitter)
        .round()
        .clamp(1.0, MAX_BACKOFF_SECS as f64) as u64
}

/// Session connection parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ws_url: String,
    pub api_token: String,
}

/// Handle to a running session task.
///
/// Dropping the handle ends the task once its queues drain.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    outbound_tx: mpsc::Sender<OutboundRequest>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SessionHandle {
    /// Queue an outbound request. Requests queued while disconnected are
    /// sent after the next successful authorization.
    pub async fn send(&self, request: OutboundRequest) {
        if self.outbound_tx.send(request).await.is_err() {
            warn!("Session task gone; outbound request dropped");
        }
    }

    /// End the session task. It will close the socket and not reconnect.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Build a handle over caller-owned channels. Seam for custom transports
    /// and tests; pair with
    /// [`crate::engine::EngineHandle::feed_venue_event`].
    pub fn detached(
        outbound_tx: mpsc::Sender<OutboundRequest>,
        shutdown_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            outbound_tx,
            shutdown_tx,
        }
    }
}

/// Spawn the session task.
pub fn spawn(config: SessionConfig, event_tx: mpsc::Sender<VenueEvent>) -> SessionHandle {
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(run(config, event_tx, outbound_rx, shutdown_rx));
    SessionHandle {
        outbound_tx,
        shutdown_tx,
    }
}

/// Stamp the payload with the next request sequence number.
fn stamp(mut payload: Value, req_id: &mut u64) -> Value {
    if let Value::Object(map) = &mut payload {
        map.insert("req_id".to_string(), json!(*req_id));
    }
    *req_id += 1;
    payload
}

async fn run(
    config: SessionConfig,
    event_tx: mpsc::Sender<VenueEvent>,
    mut outbound_rx: mpsc::Receiver<OutboundRequest>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    // Sequence survives reconnects: strictly increasing for the session's
    // whole lifetime.
    let mut req_id: u64 = 1;
    let mut reconnect_attempt: u32 = 0;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!("Session shutdown requested");
            break;
        }

        info!(
            attempt = reconnect_attempt + 1,
            "Connecting to venue WebSocket: {}", config.ws_url
        );

        let (ws_stream, _) = match connect_async(&config.ws_url).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Failed to connect venue WebSocket");
                let _ = event_tx
                    .send(VenueEvent::TransportError(format!("connect_failed: {e}")))
                    .await;
                let _ = event_tx.send(VenueEvent::Disconnected).await;
                reconnect_attempt = reconnect_attempt.saturating_add(1);
                let sleep_secs = backoff_with_jitter_secs(reconnect_attempt);
                warn!(sleep_secs, "Retrying venue connection with backoff");
                tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
                continue;
            }
        };

        info!("Connected to venue WebSocket; authorizing");
        reconnect_attempt = 0;
        let (mut write, mut read) = ws_stream.split();

        // Authorize before anything queued gets through.
        let auth = stamp(
            OutboundRequest::Authorize {
                token: config.api_token.clone(),
            }
            .payload(),
            &mut req_id,
        );
        if let Err(e) = write.send(TungsteniteMessage::Text(auth.to_string())).await {
            warn!(error = %e, "Failed to send authorize request");
            let _ = event_tx.send(VenueEvent::Disconnected).await;
            reconnect_attempt = reconnect_attempt.saturating_add(1);
            tokio::time::sleep(Duration::from_secs(backoff_with_jitter_secs(
                reconnect_attempt,
            )))
            .await;
            continue;
        }

        let _ = event_tx.send(VenueEvent::Connected).await;

        let reconnect_reason: &'static str = loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(TungsteniteMessage::Text(text))) => {
                            match parse_frame(&text) {
                                Ok(frame) => {
                                    let _ = event_tx.send(VenueEvent::Frame(frame)).await;
                                }
                                Err(e) => {
                                    warn!(error = %e, "Dropping unparseable venue frame");
                                }
                            }
                        }
                        Some(Ok(TungsteniteMessage::Ping(data))) => {
                            let _ = write.send(TungsteniteMessage::Pong(data)).await;
                        }
                        Some(Ok(TungsteniteMessage::Close(_))) => {
                            info!("Venue WebSocket closed by server");
                            break "remote_close";
                        }
                        Some(Err(e)) => {
                            error!("Venue WebSocket error: {}", e);
                            let _ = event_tx
                                .send(VenueEvent::TransportError(format!("stream_error: {e}")))
                                .await;
                            break "stream_error";
                        }
                        None => {
                            info!("Venue WebSocket stream ended");
                            break "stream_ended";
                        }
                        _ => {}
                    }
                }

                request = outbound_rx.recv() => {
                    match request {
                        Some(request) => {
                            let payload = stamp(request.payload(), &mut req_id);
                            debug!(payload = %payload, "Sending venue request");
                            if let Err(e) = write
                                .send(TungsteniteMessage::Text(payload.to_string()))
                                .await
                            {
                                warn!(error = %e, "Venue request send failed");
                                break "send_failed";
                            }
                        }
                        None => {
                            info!("Engine dropped the session handle");
                            let _ = write.send(TungsteniteMessage::Close(None)).await;
                            let _ = event_tx.send(VenueEvent::Disconnected).await;
                            return Ok(());
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Shutting down venue session");
                    let _ = write.send(TungsteniteMessage::Close(None)).await;
                    let _ = event_tx.send(VenueEvent::Disconnected).await;
                    return Ok(());
                }
            }
        };

        let _ = event_tx.send(VenueEvent::Disconnected).await;
        reconnect_attempt = reconnect_attempt.saturating_add(1);
        let sleep_secs = backoff_with_jitter_secs(reconnect_attempt);
        warn!(
            reason = reconnect_reason,
            attempt = reconnect_attempt,
            sleep_secs,
            "Venue reconnect scheduled"
        );
        tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
    }

    Ok(())
}
