//! WebSocket gateway: pure transport plumbing feeding the connection
//! registry. Clients are registered on accept and deregistered on
//! disconnect; client-sent frames are read only to track liveness.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::connections::Frame;
use crate::metrics::{CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED, CONNECTIONS_OPENED};
use crate::server::AppState;

const CHANNEL_BUFFER_SIZE: usize = 32;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    // Channel for frames destined for this connection
    let (tx, mut rx) = mpsc::channel::<Frame>(CHANNEL_BUFFER_SIZE);

    let handle = state.registry.add(tx);
    let connection_id = handle.id;

    CONNECTIONS_OPENED.inc();
    CONNECTIONS_ACTIVE.inc();

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task draining the frame channel into the socket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Ping => Message::Ping(Bytes::new()),
                Frame::Close => {
                    // Registry-initiated close, e.g. a stale connection
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Task reading (and discarding) client frames to detect liveness
    let handle_clone = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %handle_clone.id, "Received close frame");
                    break;
                }
                Ok(_) => {
                    // Client frames carry no application semantics
                    handle_clone.update_activity().await;
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %handle_clone.id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Either task ending means the connection is done
    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    state.registry.remove(connection_id);

    CONNECTIONS_CLOSED.inc();
    CONNECTIONS_ACTIVE.dec();

    tracing::info!(connection_id = %connection_id, "WebSocket connection closed");
}
