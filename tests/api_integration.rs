//! HTTP endpoint tests driven through the router with `tower::ServiceExt`

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;

use realtime_hub::config::Settings;
use realtime_hub::hub::{ClientId, Connection, Hub, HubHandle};
use realtime_hub::server::{create_app, AppState};
use realtime_hub::websocket::Message;

/// Router backed by a running hub. Keep the sender alive for the test.
fn app() -> (Router, HubHandle, broadcast::Sender<()>) {
    let (hub, handle) = Hub::new();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(hub.run(shutdown_rx));
    let app = create_app(AppState::new(Settings::default(), handle.clone()));
    (app, handle, shutdown_tx)
}

async fn register(hub: &HubHandle, id: &str) -> mpsc::Receiver<Message> {
    let (connection, mut rx) = Connection::open(ClientId::from(id), 8);
    hub.register(connection).unwrap();
    assert_eq!(rx.recv().await.unwrap().kind, "connected");
    rx
}

/// Wait until every event queued so far for this client has been applied
async fn settle(hub: &HubHandle, id: &str, rx: &mut mpsc::Receiver<Message>) {
    hub.send_to(&ClientId::from(id), Message::new("sync")).unwrap();
    assert_eq!(rx.recv().await.unwrap().kind, "sync");
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, hub, _shutdown) = app();
    let _rx = register(&hub, "a").await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["connections"]["total"], 1);
}

#[tokio::test]
async fn test_clients_snapshot() {
    let (app, hub, _shutdown) = app();
    let _rx_b = register(&hub, "b").await;
    let mut rx_a = register(&hub, "a").await;
    hub.subscribe(&ClientId::from("a"), "projects").unwrap();
    settle(&hub, "a", &mut rx_a).await;

    let response = app.oneshot(get("/api/clients")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["type"], "clientsSnapshot");
    assert_eq!(body["count"], 2);
    assert_eq!(body["clients"], json!(["a", "b"]));
    let details = body["details"].as_array().unwrap();
    assert_eq!(details[0]["id"], "a");
    assert_eq!(details[0]["channels"], json!(["projects"]));
    assert_eq!(details[1]["id"], "b");
    assert_eq!(details[1]["channels"], json!([]));
    assert!(details.iter().all(|d| d["connectedAt"].is_string()));
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_current_time_document() {
    let (app, _hub, _shutdown) = app();

    let response = app.oneshot(get("/api/time")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["type"], "currentTime");
    assert!(body["unix"].is_i64());
    assert!(body["components"]["year"].as_i64().unwrap() >= 2024);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (app, _hub, _shutdown) = app();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("hub_clients_connected"));
}

#[tokio::test]
async fn test_broadcast_endpoint_accepts_message() {
    let (app, hub, _shutdown) = app();
    let mut rx = register(&hub, "a").await;

    let response = app
        .oneshot(post_json(
            "/api/v1/broadcast",
            json!({"type": "announcement", "data": {"text": "hi"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await, json!({"accepted": true}));

    let delivered = rx.recv().await.unwrap();
    assert_eq!(delivered.kind, "announcement");
    assert_eq!(delivered.data, Some(json!({"text": "hi"})));
}

#[tokio::test]
async fn test_broadcast_endpoint_requires_type() {
    let (app, _hub, _shutdown) = app();

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/broadcast", json!({"data": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

    let response = app
        .oneshot(post_json("/api/v1/broadcast", json!({"type": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_direct_message_endpoint() {
    let (app, hub, _shutdown) = app();
    let mut rx = register(&hub, "a").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/clients/a/messages",
            json!({"type": "notice"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert_eq!(rx.recv().await.unwrap().kind, "notice");

    let response = app
        .oneshot(post_json(
            "/api/v1/clients/ghost/messages",
            json!({"type": "notice"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
}
