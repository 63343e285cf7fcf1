use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::hub::{ClientId, Connection, HubError, HubHandle};
use crate::metrics::WsMessageMetrics;
use crate::server::AppState;

use super::protocol::Command;
use super::Message;

/// How long the outbound pump may take to flush and close after unregister
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = state.hub.clone();
    let capacity = state.settings.hub.outbound_buffer;

    ws.max_message_size(state.settings.hub.max_message_size)
        .on_failed_upgrade(|e| {
            tracing::warn!(error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_socket(socket, hub, capacity))
}

/// Run one accepted connection until either pump stops.
///
/// The connection is registered with a fresh identity, then an outbound pump
/// (buffer -> socket) and an inbound pump (socket -> hub) run side by side.
/// Whichever finishes first tears the other down, and the client is always
/// unregistered before returning.
pub async fn handle_socket(socket: WebSocket, hub: HubHandle, capacity: usize) {
    let client_id = ClientId::generate();
    serve_connection(socket, hub, client_id, capacity).await;
}

#[tracing::instrument(name = "ws.connection", skip_all, fields(client_id = %client_id))]
async fn serve_connection(socket: WebSocket, hub: HubHandle, client_id: ClientId, capacity: usize) {
    let started = Instant::now();
    let (connection, outbound) = Connection::open(client_id.clone(), capacity);
    let serial = connection.serial();

    if let Err(e) = hub.register(connection) {
        tracing::warn!(error = %e, "Connection rejected");
        return;
    }

    let (ws_sender, ws_receiver) = socket.split();

    let mut send_task = tokio::spawn(outbound_pump(ws_sender, outbound, client_id.clone()));
    let mut recv_task = tokio::spawn(inbound_pump(ws_receiver, hub.clone(), client_id.clone()));

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!("Outbound pump completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!("Inbound pump completed");
            // Closing the buffer lets the outbound pump drain and close the socket
            let _ = hub.unregister(&client_id, serial);
            if tokio::time::timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
                tracing::warn!("Outbound pump did not finish in time, aborting");
                send_task.abort();
            }
        }
    }

    // Idempotent; covers the outbound-first path
    let _ = hub.unregister(&client_id, serial);

    tracing::info!(
        duration_secs = started.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Drain the outbound buffer onto the socket. Exits on write failure or once
/// the hub has closed the buffer and it is empty; closes the socket on exit.
async fn outbound_pump(
    mut ws_sender: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<Message>,
    client_id: ClientId,
) {
    while let Some(message) = outbound.recv().await {
        let text = match message.to_json() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "Failed to serialize message");
                continue;
            }
        };

        if let Err(e) = ws_sender.send(WsMessage::Text(text.into())).await {
            tracing::debug!(client_id = %client_id, error = %e, "WebSocket write failed");
            break;
        }
    }

    let _ = ws_sender.close().await;
}

/// Read frames and hand decoded commands to the hub until the peer goes away
async fn inbound_pump(
    mut ws_receiver: SplitStream<WebSocket>,
    hub: HubHandle,
    client_id: ClientId,
) {
    while let Some(result) = ws_receiver.next().await {
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "WebSocket receive error");
                break;
            }
        };

        let outcome = match frame {
            WsMessage::Text(text) => handle_frame(text.as_bytes(), &hub, &client_id),
            WsMessage::Binary(bytes) => handle_frame(&bytes, &hub, &client_id),
            // Pongs are answered by the transport
            WsMessage::Ping(_) | WsMessage::Pong(_) => Ok(()),
            WsMessage::Close(_) => {
                tracing::debug!(client_id = %client_id, "Received close frame");
                break;
            }
        };

        if outcome.is_err() {
            tracing::warn!(client_id = %client_id, "Hub unavailable, closing connection");
            break;
        }
    }
}

/// Apply one inbound frame: forward any subscription intent to the hub, then
/// queue the reply for this client only.
pub fn handle_frame(frame: &[u8], hub: &HubHandle, client_id: &ClientId) -> Result<(), HubError> {
    let response = match Command::decode(frame) {
        Ok(command) => {
            match &command {
                Command::Subscribe(channel) => {
                    WsMessageMetrics::record_subscribe();
                    hub.subscribe(client_id, channel.clone())?;
                }
                Command::Unsubscribe(channel) => {
                    WsMessageMetrics::record_unsubscribe();
                    hub.unsubscribe(client_id, channel.clone())?;
                }
                Command::Ping => WsMessageMetrics::record_ping(),
                Command::Echo(_) => WsMessageMetrics::record_echo(),
            }
            command.response()
        }
        Err(e) => {
            WsMessageMetrics::record_invalid();
            tracing::warn!(client_id = %client_id, error = ?e, "Rejected client message");
            Message::error(e.to_string())
        }
    };

    hub.send_to(client_id, response)
}
