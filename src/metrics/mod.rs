//! Prometheus metrics for the hub.
//!
//! - Connection metrics (connected clients, active channels, registrations)
//! - Fan-out metrics (broadcasts by scope, deliveries, evictions)
//! - Inbound control message counts

mod helpers;

pub use helpers::{encode_metrics, HubMetrics, WsMessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "hub";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Clients currently in the registry
    pub static ref CLIENTS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_clients_connected", METRIC_PREFIX),
        "Number of clients currently registered with the hub"
    ).unwrap();

    /// Channels with at least one subscriber
    pub static ref CHANNELS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_channels_active", METRIC_PREFIX),
        "Number of channels with at least one subscriber"
    ).unwrap();

    pub static ref REGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_registrations_total", METRIC_PREFIX),
        "Total clients registered"
    ).unwrap();

    pub static ref UNREGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_unregistrations_total", METRIC_PREFIX),
        "Total clients unregistered after disconnect"
    ).unwrap();

    /// Clients dropped because their outbound buffer was full or closed
    pub static ref EVICTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_evictions_total", METRIC_PREFIX),
        "Total clients evicted on failed enqueue",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Fan-out Metrics
    // ============================================================================

    pub static ref BROADCASTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcasts processed",
        &["scope"]
    ).unwrap();

    pub static ref DELIVERIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Total messages enqueued onto client buffers"
    ).unwrap();

    // ============================================================================
    // WebSocket Metrics
    // ============================================================================

    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total control messages received from clients",
        &["type"]
    ).unwrap();
}
