// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_gauge_vec_with_registry, CounterVec, Encoder,
    GaugeVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Cache operations
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cache_operations_total", "Total response cache operations"),
        &["operation"], // operation: hit, miss, expired, eviction, fetch
        REGISTRY
    ).unwrap();

    /// Current cache entries
    pub static ref CACHE_ENTRIES: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("cache_entries_current", "Current number of cache entries"),
        &["type"], // type: active
        REGISTRY
    ).unwrap();

    // ============================================================================
    // REALTIME METRICS
    // ============================================================================

    /// Connection state transitions
    pub static ref REALTIME_CONNECTIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("realtime_connections_total", "Realtime channel connection transitions"),
        &["status"], // status: opened, closed, abnormal, failed, exhausted
        REGISTRY
    ).unwrap();

    /// Reconnection attempts scheduled
    pub static ref RECONNECT_ATTEMPTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("realtime_reconnect_attempts_total", "Reconnection attempts scheduled"),
        &["outcome"], // outcome: scheduled, exhausted
        REGISTRY
    ).unwrap();

    /// Messages crossing the channel
    pub static ref REALTIME_MESSAGES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("realtime_messages_total", "Realtime messages by direction"),
        &["direction"], // direction: inbound, outbound, dropped, heartbeat
        REGISTRY
    ).unwrap();

    /// 1 while the channel is open, 0 otherwise
    pub static ref REALTIME_CONNECTED: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("realtime_connected", "Whether the realtime channel is open"),
        &["channel"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // SESSION STORE METRICS
    // ============================================================================

    /// Token store operations
    pub static ref TOKEN_STORE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("token_store_operations_total", "Encrypted token store operations"),
        &["operation"], // operation: write, read, decrypt_failure, cleared
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and encode them as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
