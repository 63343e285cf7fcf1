// Core hub (registry and serialized event loop)
pub mod hub;

// Transport and wire protocol
pub mod websocket;

// Producers
pub mod events;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;
