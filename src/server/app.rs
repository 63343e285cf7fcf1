use std::time::Duration;

use axum::{
    http::{HeaderValue, StatusCode},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api::{api_routes, stream_routes};
use crate::config::ServerConfig;
use crate::websocket::ws_handler;

use super::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.server);

    let upgrade_routes = with_handshake_timeout(
        Router::new()
            .route("/ws", get(ws_handler))
            .merge(stream_routes()),
        state.settings.hub.handshake_timeout(),
    );

    Router::new()
        // WebSocket endpoints
        .merge(upgrade_routes)
        // Merge API routes
        .merge(api_routes())
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        // Add state
        .with_state(state)
}

/// Bound the upgrade request. The upgraded socket outlives the response and
/// is not affected.
fn with_handshake_timeout(routes: Router<AppState>, timeout: Duration) -> Router<AppState> {
    routes.layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        timeout,
    ))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
