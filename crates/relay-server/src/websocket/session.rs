//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::ParticipantId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::service::ChatService;

/// Ping cadence and liveness window.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between server pings.
    pub interval: Duration,
    /// Silence after which the client is dropped.
    pub timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        }
    }
}

/// `connection.established` frame sent right after registration.
pub fn established_frame(conn_id: &str, participant: &str) -> String {
    serde_json::json!({
        "type": "connection.established",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "data": {
            "connectionId": conn_id,
            "participant": participant,
        },
    })
    .to_string()
}

/// Run a session for `participant`.
///
/// 1. Registers a connection and sends `connection.established`
/// 2. Forwards the outbound buffer to the socket, pinging on `heartbeat`
/// 3. Treats inbound frames as liveness only; messages are posted over HTTP
/// 4. Unregisters when the socket closes, the client goes silent, a
///    dispatch worker prunes the connection, or `shutdown` fires
#[instrument(skip_all, fields(participant = %participant))]
pub async fn run_ws_session(
    ws: WebSocket,
    participant: ParticipantId,
    service: Arc<ChatService>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (connection, mut outbound_rx) = service.register_connection(participant);
    let conn_id = connection.id().clone();
    let started = Instant::now();

    info!(%conn_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let hello = established_frame(&conn_id, connection.participant());
    if ws_tx.send(WsMessage::Text(hello.into())).await.is_err() {
        warn!(%conn_id, "failed to send connection.established");
    }

    let writer_conn = Arc::clone(&connection);
    let mut writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(heartbeat.interval);
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                payload = outbound_rx.recv() => {
                    let Some(payload) = payload else {
                        // Unregistered elsewhere; tell the client and stop.
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    };
                    if ws_tx.send(WsMessage::Text(payload.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if !writer_conn.check_alive()
                        && writer_conn.last_pong_elapsed() > heartbeat.timeout
                    {
                        warn!(timeout = ?heartbeat.timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = &mut writer => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Close(_))) => {
                    debug!(%conn_id, "client sent close frame");
                    break;
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => connection.mark_alive(),
                Some(Ok(WsMessage::Text(_) | WsMessage::Binary(_))) => {
                    connection.mark_alive();
                    debug!(%conn_id, "ignoring inbound data frame");
                }
                Some(Err(e)) => {
                    debug!(%conn_id, error = %e, "socket read failed");
                    break;
                }
                None => break,
            },
        }
    }

    let _ = service.unregister_connection(&connection);
    writer.abort();

    info!(%conn_id, dropped = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}
