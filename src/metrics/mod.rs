// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    CACHE_ENTRIES,
    CACHE_OPERATIONS,
    REALTIME_CONNECTED,
    REALTIME_CONNECTIONS,
    REALTIME_MESSAGES,
    RECONNECT_ATTEMPTS,
    TOKEN_STORE_OPERATIONS,
};

/// Helper to record response cache operations
pub fn record_cache_hit() {
    CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    CACHE_OPERATIONS.with_label_values(&["miss"]).inc();
}

pub fn record_cache_expired() {
    CACHE_OPERATIONS.with_label_values(&["expired"]).inc();
}

pub fn record_cache_eviction() {
    CACHE_OPERATIONS.with_label_values(&["eviction"]).inc();
}

pub fn record_cache_fetch() {
    CACHE_OPERATIONS.with_label_values(&["fetch"]).inc();
}

pub fn update_cache_entries(count: usize) {
    CACHE_ENTRIES.with_label_values(&["active"]).set(count as f64);
}

/// Helper to record realtime channel transitions
pub fn record_connection(status: &str) {
    REALTIME_CONNECTIONS.with_label_values(&[status]).inc();
    let connected = if status == "opened" { 1.0 } else { 0.0 };
    REALTIME_CONNECTED.with_label_values(&["default"]).set(connected);
}

pub fn record_reconnect(outcome: &str) {
    RECONNECT_ATTEMPTS.with_label_values(&[outcome]).inc();
}

pub fn record_message(direction: &str) {
    REALTIME_MESSAGES.with_label_values(&[direction]).inc();
}

/// Helper to record token store operations
pub fn record_token_operation(operation: &str) {
    TOKEN_STORE_OPERATIONS.with_label_values(&[operation]).inc();
}
