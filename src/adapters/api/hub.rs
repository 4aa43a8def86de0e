//! WebSocket Push Hub - Per-Symbol Subscriptions
//!
//! Each socket registers one broadcaster handle. Clients join and leave
//! symbol groups with small JSON frames and receive every update
//! published for the groups they belong to.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ApiState;
use crate::domain::{InternalSymbol, PriceUpdate};
use crate::usecases::broadcaster::SubscriberHandle;

/// Frames sent by clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe { symbol: String },
    Unsubscribe { symbol: String },
}

/// Frames sent to clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Price(PriceUpdate),
    Subscribed { symbol: InternalSymbol },
    Unsubscribed { symbol: InternalSymbol },
    Error { message: String },
}

/// `GET /ws/prices`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let (handle, mut updates) = state.broadcaster.register();
    state.metrics.subscribers.inc();
    info!(subscriber = %handle, "Push subscriber connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;
            () = state.shutdown.cancelled() => {
                if let Err(e) = sender.send(Message::Close(None)).await {
                    debug!(subscriber = %handle, error = %e, "Push socket close failed");
                }
                break;
            }
            Some(update) = updates.recv() => {
                if send_frame(&mut sender, &ServerFrame::Price(update)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = apply_client_frame(&state, handle, &text);
                    if send_frame(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(subscriber = %handle, error = %e, "Push socket error");
                    break;
                }
            },
        }
    }

    state.broadcaster.unregister(handle);
    state.metrics.subscribers.dec();
    info!(subscriber = %handle, "Push subscriber disconnected");
}

/// Apply one client frame to the broadcaster and build the reply.
pub fn apply_client_frame(state: &ApiState, handle: SubscriberHandle, text: &str) -> ServerFrame {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(subscriber = %handle, error = %e, "Malformed client frame");
            return ServerFrame::Error {
                message: format!("invalid frame: {e}"),
            };
        }
    };

    match frame {
        ClientFrame::Subscribe { symbol } => {
            let symbol = InternalSymbol::normalized(&symbol);
            if symbol.as_str().is_empty() {
                return ServerFrame::Error {
                    message: "symbol must not be empty".to_string(),
                };
            }
            state.broadcaster.join(handle, &symbol);
            info!(subscriber = %handle, symbol = %symbol, "Subscribed");
            ServerFrame::Subscribed { symbol }
        }
        ClientFrame::Unsubscribe { symbol } => {
            let symbol = InternalSymbol::normalized(&symbol);
            state.broadcaster.leave(handle, &symbol);
            info!(subscriber = %handle, symbol = %symbol, "Unsubscribed");
            ServerFrame::Unsubscribed { symbol }
        }
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            warn!(error = %e, "Failed to encode server frame");
            Ok(())
        }
    }
}
