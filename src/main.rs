use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use realtime_hub::config::Settings;
use realtime_hub::hub::Hub;
use realtime_hub::server::{create_app, AppState};
use realtime_hub::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.log);
    tracing::info!(
        outbound_buffer = settings.hub.outbound_buffer,
        handshake_timeout_secs = settings.hub.handshake_timeout_secs,
        "Configuration loaded"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start the hub event loop in background
    let (hub, handle) = Hub::new();
    let hub_handle = tokio::spawn(hub.run(shutdown_tx.subscribe()));

    // Create application state
    let state = AppState::new(settings.clone(), handle);
    tracing::info!("Application state initialized");

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx.clone()))
        .await?;

    // The listener may also stop on its own; make sure the hub follows
    let _ = shutdown_tx.send(());

    tracing::info!("Waiting for hub to close connections...");
    if let Err(e) = hub_handle.await {
        tracing::error!(error = %e, "Hub task failed");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop the hub; it closes every client's outbound buffer
    let _ = shutdown_tx.send(());
}
