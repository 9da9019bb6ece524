use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::notification::Notification;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    /// Stream this recipient's notifications instead of engine events.
    pub recipient_id: Option<Uuid>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match params.recipient_id {
        Some(recipient_id) => {
            let rx = state.notification_events_tx.subscribe();
            ws.on_upgrade(move |socket| {
                handle_socket(socket, rx, move |n: &Notification| n.recipient_id == recipient_id)
            })
        }
        None => {
            let rx = state.events_tx.subscribe();
            ws.on_upgrade(|socket| handle_socket(socket, rx, |_| true))
        }
    }
}

async fn handle_socket<T, F>(socket: WebSocket, rx: broadcast::Receiver<T>, wanted: F)
where
    T: Serialize + Clone + Send + 'static,
    F: Fn(&T) -> bool + Send + 'static,
{
    let (mut sender, mut receiver) = socket.split();
    let mut stream = BroadcastStream::new(rx);

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            let item = match item {
                Ok(item) => item,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged");
                    continue;
                }
            };
            if !wanted(&item) {
                continue;
            }

            let json = match serde_json::to_string(&item) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize message for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
