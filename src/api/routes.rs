use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::broadcast::{broadcast, send_to_client};
use super::clients::clients;
use super::health::health;
use super::metrics::prometheus_metrics;
use super::time::time;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        // Producer endpoints
        .nest(
            "/api/v1",
            Router::new()
                .route("/broadcast", post(broadcast))
                .route("/clients/{client_id}/messages", post(send_to_client)),
        )
}

/// Endpoints answering with JSON, or with a WebSocket stream when upgraded
pub fn stream_routes() -> Router<AppState> {
    Router::new()
        .route("/api/clients", get(clients))
        .route("/api/time", get(time))
}
