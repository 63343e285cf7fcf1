//! HTTP producer endpoints that hand messages to the hub.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::hub::ClientId;
use crate::server::AppState;
use crate::websocket::Message;

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

fn accepted() -> (StatusCode, Json<AcceptedResponse>) {
    (StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true }))
}

fn validated(payload: std::result::Result<Json<Message>, JsonRejection>) -> Result<Message> {
    let Json(message) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    if message.kind.is_empty() {
        return Err(AppError::Validation("Message type required".to_string()));
    }
    Ok(message)
}

/// POST /api/v1/broadcast
///
/// Fans out to every client, or only to subscribers when `channel` is set.
pub async fn broadcast(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Message>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    let message = validated(payload)?;

    tracing::info!(
        kind = %message.kind,
        channel = %message.channel,
        "Broadcast accepted"
    );
    state.hub.broadcast(message)?;

    Ok(accepted())
}

/// POST /api/v1/clients/{client_id}/messages
pub async fn send_to_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    payload: std::result::Result<Json<Message>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    let message = validated(payload)?;
    let client_id = ClientId::from(client_id);

    if !state.hub.is_registered(&client_id).await {
        return Err(AppError::NotFound(format!("Client not found: {}", client_id)));
    }

    tracing::info!(client_id = %client_id, kind = %message.kind, "Direct message accepted");
    state.hub.send_to(&client_id, message)?;

    Ok(accepted())
}
