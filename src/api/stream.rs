//! Periodic push over an upgraded socket, shared by the status and time streams.

use std::future::Future;
use std::time::Duration;

use axum::{
    extract::ws::{Message as WsMessage, WebSocket},
    http::{header, HeaderMap},
};
use futures::SinkExt;
use serde::Serialize;
use tokio::time::MissedTickBehavior;

/// Whether the request asked to be upgraded to a WebSocket
pub fn wants_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Send `next()` once per period until the peer closes or a write fails.
///
/// Inbound frames are read only to notice the close; their content is ignored.
pub async fn push_every<F, Fut, T>(mut socket: WebSocket, period: Duration, mut next: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    T: Serialize,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately; the first push goes out after one period
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let text = match serde_json::to_string(&next().await) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize stream update");
                        break;
                    }
                };
                if let Err(e) = socket.send(WsMessage::Text(text.into())).await {
                    tracing::debug!(error = %e, "Stream write failed");
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = SinkExt::close(&mut socket).await;
}
