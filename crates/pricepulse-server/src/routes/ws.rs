//! `GET /ws`: live stream of committed prices.
//!
//! Each frame is a JSON `PriceNotification`. Clients only see prices
//! committed after they connected; a client that falls behind skips ahead.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use pricepulse::market_data::PriceNotification;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn frame(notification: &PriceNotification) -> Option<Message> {
    match serde_json::to_string(notification) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!(error = %e, "failed to serialize price notification");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    debug!(subscribers = state.notifier.subscriber_count(), "websocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.notifier.subscribe();
    let mut shutdown = state.shutdown.clone();

    let send_task = tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = updates.recv() => next,
            };
            match next {
                Ok(notification) => {
                    let Some(message) = frame(&notification) else {
                        continue;
                    };
                    if sender.send(message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket client lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Inbound frames are ignored; reading only detects disconnects.
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    debug!(error = %e, "websocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }
    debug!("websocket client disconnected");
}
