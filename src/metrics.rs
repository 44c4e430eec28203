// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for pluggable-cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `pluggable_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `adapter`: memory, filesystem, redis, mongodb, black_hole
//! - `operation`: get_item, set_items, flush, ...
//! - `status`: success, error

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record one dispatched operation
pub fn record_operation(adapter: &str, operation: &str, status: &str) {
    counter!(
        "pluggable_cache_operations_total",
        "adapter" => adapter.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(adapter: &str, operation: &str, duration: Duration) {
    histogram!(
        "pluggable_cache_operation_seconds",
        "adapter" => adapter.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// A `.pre` listener stopped propagation and the native call was skipped
pub fn record_short_circuit(adapter: &str, operation: &str) {
    counter!(
        "pluggable_cache_short_circuits_total",
        "adapter" => adapter.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// An `.exception` listener swallowed a native error
pub fn record_suppressed_error(adapter: &str, operation: &str) {
    counter!(
        "pluggable_cache_suppressed_errors_total",
        "adapter" => adapter.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a probabilistic maintenance run (`clear_expired`, `optimize`)
pub fn record_sweep(kind: &str) {
    counter!(
        "pluggable_cache_sweeps_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a writer that was turned away after an abort
pub fn record_aborted_write(operation: &str) {
    counter!(
        "pluggable_cache_aborted_writes_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Timer guard that records latency on drop
pub struct LatencyTimer {
    adapter: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(adapter: &'static str, operation: &'static str) -> Self {
        Self {
            adapter,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.adapter, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_record_helpers_do_not_panic_without_recorder() {
        record_operation("memory", "get_item", "success");
        record_latency("memory", "get_item", Duration::from_micros(100));
        record_short_circuit("memory", "set_item");
        record_suppressed_error("redis", "get_item");
        record_sweep("clear_expired");
        record_aborted_write("set_item");
    }

    #[test]
    fn test_operation_counter_is_labelled() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_operation("memory", "get_item", "success");
            record_operation("memory", "get_item", "success");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let (key, _, _, value) = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "pluggable_cache_operations_total")
            .expect("counter recorded");
        assert!(key
            .key()
            .labels()
            .any(|l| l.key() == "operation" && l.value() == "get_item"));
        assert_eq!(*value, DebugValue::Counter(2));
    }

    #[test]
    fn test_latency_timer_records_on_drop() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let _timer = LatencyTimer::new("memory", "set_item");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert!(snapshot
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "pluggable_cache_operation_seconds"));
    }
}
