//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS, read `client_id` / `role` from the query string
//! - Register the connection with the hub for its whole lifetime
//! - Inbound STOMP text frames -> envelope -> produce topic
//! - Lifecycle: ping/pong + idle timeout, hub-initiated close

use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

use ragbridge_core::error::{BridgeError, Result};
use ragbridge_core::protocol::stomp;

use crate::app_state::AppState;
use crate::dispatch::CLIENT_ID_HEADER;
use crate::hub::WsTransport;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub client_id: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "viewer".into()
}

fn error_json(err: &BridgeError) -> String {
    json!({
        "value": {
            "answer": err.public_message(),
            "hits": [],
            "error": err.client_code().as_str(),
        }
    })
    .to_string()
}

pub async fn ws_upgrade(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let span = tracing::info_span!("ws_session", client_id = %q.client_id, role = %q.role);
        if let Err(e) = run_session(app, q, socket).instrument(span).await {
            tracing::debug!(error = %e, "session ended with error");
        }
    })
}

async fn run_session(app: AppState, q: WsQuery, socket: WebSocket) -> Result<()> {
    if q.client_id.trim().is_empty() {
        return Err(BridgeError::BadRequest("client_id must not be empty".into()));
    }

    let hub_cfg = &app.cfg().hub;
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(hub_cfg.outbound_queue);
    let (transport, mut closed_rx) =
        WsTransport::new(out_tx.clone(), Duration::from_millis(hub_cfg.send_timeout_ms));

    let hub = app.hub();
    let conn = hub
        .connect(q.client_id.clone(), Arc::new(transport), q.role.clone())
        .await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    let gw = &app.cfg().gateway;
    let ping_every = Duration::from_millis(gw.ping_interval_ms);
    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);

    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(m) => {
                        let closing = matches!(m, Message::Close(_));
                        if ws_tx.send(m).await.is_err() || closing {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // superseded by a newer connection with the same id, or dropped by the hub
            changed = closed_rx.changed() => {
                if changed.is_err() || *closed_rx.borrow() {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break; };
                let Ok(msg) = incoming else { break; };

                last_activity = Instant::now();

                match msg {
                    Message::Text(text) => {
                        if let Err(e) = forward_frame(&app, &q.client_id, &text).await {
                            let _ = out_tx.try_send(Message::Text(error_json(&e)));
                        }
                    }
                    Message::Binary(_) => {
                        let e = BridgeError::BadRequest("binary frames are not supported".into());
                        let _ = out_tx.try_send(Message::Text(error_json(&e)));
                    }
                    Message::Ping(payload) => {
                        let _ = out_tx.try_send(Message::Pong(payload));
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }

            // ping
            _ = ping_tick.tick() => {
                let _ = out_tx.try_send(Message::Ping(Vec::new()));
            }

            // idle timeout
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::info!("idle timeout");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    hub.release(&conn).await;
    tracing::info!("session closed");
    Ok(())
}

/// Decode one STOMP frame and publish it, keyed and tagged with the client id.
async fn forward_frame(app: &AppState, client_id: &str, text: &str) -> Result<()> {
    let env = stomp::decode(text)?.with_header(CLIENT_ID_HEADER, client_id);
    app.producer()
        .send(app.produce_topic(), Some(client_id), &env)
        .await?;
    tracing::debug!(command = %env.command(), "frame forwarded");
    Ok(())
}
