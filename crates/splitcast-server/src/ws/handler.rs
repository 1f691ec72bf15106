use crate::error::Result;
use crate::sfu::ControlChannel;
use crate::state::AppState;
use crate::transport::TransportEngine;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use splitcast_protocol::ClientMessage;

pub async fn ws_handler<E: TransportEngine>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<E>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Decode one control message
pub fn decode(payload: &[u8]) -> Result<ClientMessage> {
    Ok(serde_json::from_slice(payload)?)
}

async fn handle_socket<E: TransportEngine>(socket: WebSocket, state: AppState<E>) {
    let (mut sender, mut receiver) = socket.split();

    let (channel, mut outbound) = ControlChannel::pair();
    let session = state.sfu.on_connect(channel).await;
    let client_id = session.id().clone();

    // Spawn task to forward messages from the control channel to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Messages are handled one at a time, in the order they were read
    loop {
        tokio::select! {
            msg = receiver.next() => {
                let decoded = match msg {
                    Some(Ok(Message::Text(text))) => decode(text.as_str().as_bytes()),
                    Some(Ok(Message::Binary(data))) => decode(&data),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error for client {}: {}", client_id, e);
                        break;
                    }
                };

                match decoded {
                    Ok(message) => state.sfu.dispatch(&client_id, message).await,
                    Err(e) => session.report(&e),
                }
            }
            _ = &mut send_task => {
                tracing::warn!("Lost outbound WebSocket for client {}", client_id);
                break;
            }
        }
    }

    // Cleanup on disconnect
    state.sfu.on_disconnect(&client_id).await;

    send_task.abort();
}
