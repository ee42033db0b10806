use axum::{debug_handler, extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};

use crate::AppState;

use super::{dispatch, events::Inbound};

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    State(state): State<AppState>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve(state, stream))
}

async fn serve(state: AppState, stream: WebSocket) {
    let (conn, mut rx) = state.hub.connect().await;
    let (mut sender, mut receiver) = stream.split();
    tracing::debug!(%conn, "connection opened");

    let mut outbound_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(%conn, error = %err, "unserializable event dropped");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Frames of one connection are handled strictly in arrival order.
    loop {
        tokio::select! {
            _ = &mut outbound_task => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Inbound>(text.as_str()) {
                    Ok(event) => dispatch::dispatch(&state, conn, event).await,
                    Err(err) => tracing::warn!(%conn, error = %err, "ignoring malformed frame"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        }
    }

    dispatch::disconnect(&state, conn).await;
    outbound_task.abort();
}
