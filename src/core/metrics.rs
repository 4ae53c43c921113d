// src/core/metrics.rs

//! Defines and registers Prometheus metrics for broker monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Broker-wide Gauges ---
    /// The number of sessions currently registered with the engine.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("harrier_connected_clients", "Number of currently connected clients.").unwrap();
    /// The engine's own accounting of stored payloads and entity overhead.
    pub static ref MEMORY_USED_BYTES: Gauge =
        register_gauge!("harrier_memory_used_bytes", "Approximate memory used by broker state in bytes.").unwrap();
    /// Set while the memory ceiling is exceeded and DENY_OOM commands are refused.
    pub static ref OVER_MEMORY_LIMIT: Gauge =
        register_gauge!("harrier_over_memory_limit", "Memory ceiling exceeded (1 for true, 0 for false).").unwrap();
    /// A boolean gauge indicating if a background snapshot save is in progress.
    pub static ref SNAPSHOT_SAVE_IN_PROGRESS: Gauge =
        register_gauge!("harrier_snapshot_save_in_progress", "Snapshot save in progress (1 for true, 0 for false).").unwrap();

    // --- Counters ---
    pub static ref COMMANDS_PROCESSED_TOTAL: Counter =
        register_counter!("harrier_commands_processed_total", "Total number of commands processed.").unwrap();
    /// Failed commands, labeled by error tag.
    pub static ref COMMAND_ERRORS_TOTAL: CounterVec =
        register_counter_vec!("harrier_command_errors_total", "Total number of commands answered with ERR.", &["tag"]).unwrap();
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("harrier_connections_received_total", "Total number of connections received.").unwrap();
    pub static ref CONNECTIONS_REJECTED_TOTAL: Counter =
        register_counter!("harrier_connections_rejected_total", "Connections refused because max_clients was reached.").unwrap();
    pub static ref MESSAGES_PUSHED: Counter =
        register_counter!("harrier_messages_pushed_total", "Total number of messages accepted by queues.").unwrap();
    pub static ref MESSAGES_DELIVERED: Counter =
        register_counter!("harrier_messages_delivered_total", "Total number of queue messages handed to clients.").unwrap();
    pub static ref MESSAGES_EXPIRED: Counter =
        register_counter!("harrier_messages_expired_total", "Total number of messages dropped because their expiry passed.").unwrap();
    pub static ref MESSAGES_REQUEUED: Counter =
        register_counter!("harrier_messages_requeued_total", "Unconfirmed messages returned to their queue.").unwrap();
    pub static ref MESSAGES_EVICTED: Counter =
        register_counter!("harrier_messages_evicted_total", "Messages evicted by force-push.").unwrap();
    pub static ref CHANNEL_MESSAGES_PUBLISHED: Counter =
        register_counter!("harrier_channel_messages_published_total", "Total number of channel deliveries.").unwrap();

    // --- Histograms ---
    /// A histogram of command execution latencies.
    pub static ref COMMAND_LATENCY_SECONDS: Histogram =
        register_histogram!("harrier_command_latency_seconds", "Latency of command processing in seconds.").unwrap();
    pub static ref SNAPSHOT_SAVE_SECONDS: Histogram =
        register_histogram!("harrier_snapshot_save_seconds", "Duration of snapshot saves in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
