//! # routes::monitor
//!
//! GET /ws/monitor — WebSocket event stream.
//!
//! On connect the client gets one `SNAPSHOT` frame (cache, open position,
//! counters), then every [`WsEvent`](crate::events::WsEvent) as a JSON
//! text frame.

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::state::SharedState;

pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// First frame every client receives.
pub async fn snapshot(state: &SharedState) -> Value {
    json!({
        "event":           "SNAPSHOT",
        "symbol":          state.config.symbol,
        "market":          state.cache.view().await,
        "position":        state.open_position().await,
        "strategy_ticks":  state.strategy_ticks.load(Ordering::Relaxed),
        "stop_loss_ticks": state.stop_loss_ticks.load(Ordering::Relaxed),
    })
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    let first = snapshot(&state).await.to_string();
    if sender.send(Message::Text(first)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}
