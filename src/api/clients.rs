//! Live client listing, as a JSON snapshot or a WebSocket stream.

use axum::{
    extract::{ws::rejection::WebSocketUpgradeRejection, State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::hub::{ClientId, HubHandle, HubSnapshot};
use crate::server::AppState;

use super::stream::{push_every, wants_upgrade};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    pub id: ClientId,
    pub channels: Vec<String>,
    pub connected_at: String,
}

#[derive(Debug, Serialize)]
pub struct ClientsSnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub count: usize,
    pub timestamp: String,
    pub clients: Vec<ClientId>,
    pub details: Vec<ClientDetail>,
}

#[derive(Debug, Serialize)]
pub struct ClientsUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub count: usize,
    pub timestamp: String,
    pub clients: Vec<ClientId>,
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl From<HubSnapshot> for ClientsSnapshot {
    fn from(snapshot: HubSnapshot) -> Self {
        Self {
            kind: "clientsSnapshot",
            count: snapshot.count,
            timestamp: rfc3339(snapshot.taken_at),
            clients: snapshot.client_ids(),
            details: snapshot
                .clients
                .into_iter()
                .map(|c| ClientDetail {
                    id: c.id,
                    channels: c.channels,
                    connected_at: rfc3339(c.connected_at),
                })
                .collect(),
        }
    }
}

impl From<HubSnapshot> for ClientsUpdate {
    fn from(snapshot: HubSnapshot) -> Self {
        Self {
            kind: "clientsUpdate",
            count: snapshot.count,
            timestamp: rfc3339(snapshot.taken_at),
            clients: snapshot.client_ids(),
        }
    }
}

/// GET /api/clients
pub async fn clients(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(ws) => {
            let hub = state.hub.clone();
            let period = state.settings.hub.status_interval();
            ws.on_upgrade(move |socket| {
                tracing::debug!("Client status stream opened");
                push_every(socket, period, move || clients_update(hub.clone()))
            })
        }
        Err(rejection) if wants_upgrade(&headers) => rejection.into_response(),
        Err(_) => {
            let snapshot = state.hub.snapshot().await;
            Json(ClientsSnapshot::from(snapshot)).into_response()
        }
    }
}

async fn clients_update(hub: HubHandle) -> ClientsUpdate {
    ClientsUpdate::from(hub.snapshot().await)
}
