//! Prometheus Metrics Module
//!
//! Application-wide metrics for the coordination layer.
//!
//! # Metrics Collected
//! - Active WebSocket session gauge
//! - Gateway events dispatched, by event type
//! - Deliveries dropped (target session gone at send time)

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active WebSocket sessions gauge
pub static SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("sessions_active", "Number of active WebSocket sessions")
            .namespace("chat_relay"),
    )
    .expect("Failed to create SESSIONS_ACTIVE metric")
});

/// Gateway events dispatched, by event type
pub static EVENTS_DISPATCHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "events_dispatched_total",
            "Total gateway events pushed to sessions",
        )
        .namespace("chat_relay"),
        &["event"],
    )
    .expect("Failed to create EVENTS_DISPATCHED_TOTAL metric")
});

/// Deliveries dropped because the target session was gone
pub static DELIVERIES_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "deliveries_dropped_total",
            "Fan-out sends that found no live session",
        )
        .namespace("chat_relay"),
        &["event"],
    )
    .expect("Failed to create DELIVERIES_DROPPED_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(SESSIONS_ACTIVE.clone()))
        .expect("Failed to register SESSIONS_ACTIVE");
    registry
        .register(Box::new(EVENTS_DISPATCHED_TOTAL.clone()))
        .expect("Failed to register EVENTS_DISPATCHED_TOTAL");
    registry
        .register(Box::new(DELIVERIES_DROPPED_TOTAL.clone()))
        .expect("Failed to register DELIVERIES_DROPPED_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}

/// Helper to record a dispatched event
pub fn record_dispatch(event: &str) {
    EVENTS_DISPATCHED_TOTAL.with_label_values(&[event]).inc();
}

/// Helper to record a dropped delivery
pub fn record_dropped(event: &str) {
    DELIVERIES_DROPPED_TOTAL.with_label_values(&[event]).inc();
}
