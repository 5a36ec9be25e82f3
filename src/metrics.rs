//! Prometheus metrics for the feed engine
//!
//! Counters and gauges covering the upstream session, the decoder, and
//! downstream fan-out. All collectors register against the default registry
//! and are exposed through the /metrics endpoint.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_gauge, Encoder, IntCounter, IntGauge, TextEncoder,
};

/// Ticks decoded from upstream frames
static TICKS_DECODED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "campustrade_feed_ticks_decoded_total",
        "Total normalized ticks decoded from upstream frames"
    )
    .expect("Failed to register ticks_decoded metric")
});

/// Frames dropped because they could not be decoded
static FRAMES_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "campustrade_feed_frames_dropped_total",
        "Total upstream frames dropped as undecodable"
    )
    .expect("Failed to register frames_dropped metric")
});

/// Upstream reconnect attempts
static RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "campustrade_feed_reconnects_total",
        "Total upstream connection attempts after the first"
    )
    .expect("Failed to register reconnects metric")
});

/// Upstream connection status (1 = streaming, 0 = not)
static UPSTREAM_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "campustrade_feed_upstream_connected",
        "Upstream feed connection status (1=streaming, 0=down)"
    )
    .expect("Failed to register upstream_connected metric")
});

/// Currently registered downstream connections
static ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "campustrade_feed_active_connections",
        "Number of registered downstream connections"
    )
    .expect("Failed to register active_connections metric")
});

/// Messages queued to downstream connections
static MESSAGES_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "campustrade_feed_messages_delivered_total",
        "Total messages queued for downstream delivery"
    )
    .expect("Failed to register messages_delivered metric")
});

/// Downstream connections dropped for failing to receive
static CONNECTIONS_PRUNED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "campustrade_feed_connections_pruned_total",
        "Total downstream connections pruned after a failed send"
    )
    .expect("Failed to register connections_pruned metric")
});

pub fn add_ticks_decoded(count: usize) {
    TICKS_DECODED.inc_by(count as u64);
}

pub fn inc_frames_dropped() {
    FRAMES_DROPPED.inc();
}

pub fn inc_reconnects() {
    RECONNECTS.inc();
}

pub fn set_upstream_connected(connected: bool) {
    UPSTREAM_CONNECTED.set(if connected { 1 } else { 0 });
}

pub fn set_active_connections(count: usize) {
    ACTIVE_CONNECTIONS.set(count as i64);
}

pub fn add_messages_delivered(count: usize) {
    MESSAGES_DELIVERED.inc_by(count as u64);
}

pub fn add_connections_pruned(count: usize) {
    CONNECTIONS_PRUNED.inc_by(count as u64);
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e)))
}
