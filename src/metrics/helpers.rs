//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BROADCASTS_TOTAL, CHANNELS_ACTIVE, CLIENTS_CONNECTED, DELIVERIES_TOTAL, EVICTIONS_TOTAL,
    REGISTRATIONS_TOTAL, UNREGISTRATIONS_TOTAL, WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording hub state metrics
pub struct HubMetrics;

impl HubMetrics {
    pub fn record_registered() {
        REGISTRATIONS_TOTAL.inc();
    }

    pub fn record_unregistered() {
        UNREGISTRATIONS_TOTAL.inc();
    }

    /// Record an eviction; `reason` is "full" or "closed"
    pub fn record_evicted(reason: &str) {
        EVICTIONS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn record_broadcast(global: bool) {
        let scope = if global { "global" } else { "channel" };
        BROADCASTS_TOTAL.with_label_values(&[scope]).inc();
    }

    pub fn record_delivered(count: u64) {
        DELIVERIES_TOTAL.inc_by(count);
    }

    pub fn set_clients(clients: usize) {
        CLIENTS_CONNECTED.set(clients as i64);
    }

    /// Refreshed at scrape time; counting distinct channels walks every
    /// subscription, so the hub loop never does it
    pub fn set_channels(channels: usize) {
        CHANNELS_ACTIVE.set(channels as i64);
    }
}

/// Helper struct for recording inbound control messages
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_subscribe() {
        WS_MESSAGES_RECEIVED.with_label_values(&["subscribe"]).inc();
    }

    pub fn record_unsubscribe() {
        WS_MESSAGES_RECEIVED
            .with_label_values(&["unsubscribe"])
            .inc();
    }

    pub fn record_ping() {
        WS_MESSAGES_RECEIVED.with_label_values(&["ping"]).inc();
    }

    pub fn record_echo() {
        WS_MESSAGES_RECEIVED.with_label_values(&["echo"]).inc();
    }

    pub fn record_invalid() {
        WS_MESSAGES_RECEIVED.with_label_values(&["invalid"]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_metrics() {
        HubMetrics::record_registered();
        HubMetrics::record_unregistered();
        HubMetrics::record_evicted("full");
        HubMetrics::record_broadcast(true);
        HubMetrics::record_broadcast(false);
        HubMetrics::record_delivered(3);
        HubMetrics::set_clients(2);
        HubMetrics::set_channels(1);
        // Just verify no panics
    }

    #[test]
    fn test_encode_contains_prefix() {
        WsMessageMetrics::record_ping();
        let output = encode_metrics().unwrap();
        assert!(output.contains("hub_ws_messages_received_total"));
    }
}
