//! Metrics for observability.
//!
//! Records through the `metrics` facade:
//! - Store connection attempts
//! - Documents upserted and deleted
//! - Collections dropped
//! - Strategy selections
//! - Isolated failures per phase
//! - Destination pass and run durations
//!
//! No exporter is installed by this crate. A host process that wants a
//! scrape endpoint installs its own recorder.
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use doc_replicator::metrics;
//! use doc_replicator::strategy::Strategy;
//! use std::time::Duration;
//!
//! metrics::record_strategy("sales@replica-a", "upsert", Strategy::Stream);
//! metrics::record_documents_deleted("sales@replica-a", "orders", 12);
//! metrics::record_destination_pass("sales@replica-a", true, Duration::from_secs(3));
//! ```

use crate::coordinator::UpsertStats;
use crate::strategy::Strategy;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a store connection attempt outcome.
pub fn record_connection(target: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "replication_connections_total",
        "target" => target.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Gauge for destinations connected at startup.
pub fn set_connected_destinations(count: usize) {
    gauge!("replication_connected_destinations").set(count as f64);
}

/// Record which strategy a phase chose for a collection.
pub fn record_strategy(destination: &str, phase: &str, strategy: Strategy) {
    counter!(
        "replication_strategy_selections_total",
        "destination" => destination.to_string(),
        "phase" => phase.to_string(),
        "strategy" => strategy.as_str()
    )
    .increment(1);
}

/// Record a finished collection upsert, split by write outcome.
pub fn record_collection_upserted(destination: &str, stats: &UpsertStats) {
    let dest = destination.to_string();

    for (outcome, count) in [
        ("inserted", stats.inserted),
        ("replaced", stats.replaced),
        ("unchanged", stats.unchanged),
    ] {
        counter!(
            "replication_documents_upserted_total",
            "destination" => dest.clone(),
            "outcome" => outcome
        )
        .increment(count);
    }

    histogram!("replication_collection_size", "destination" => dest).record(stats.documents as f64);
}

/// Record documents deleted from one destination collection.
pub fn record_documents_deleted(destination: &str, collection: &str, count: u64) {
    if count > 0 {
        counter!(
            "replication_documents_deleted_total",
            "destination" => destination.to_string(),
            "collection" => collection.to_string()
        )
        .increment(count);
    }
}

/// Record a destination-only collection dropped.
pub fn record_collection_dropped(destination: &str) {
    counter!(
        "replication_collections_dropped_total",
        "destination" => destination.to_string()
    )
    .increment(1);
}

/// Record an isolated failure caught during a phase.
pub fn record_collection_failure(destination: &str, phase: &str) {
    counter!(
        "replication_collection_failures_total",
        "destination" => destination.to_string(),
        "phase" => phase.to_string()
    )
    .increment(1);
}

/// Record a finished destination pass.
pub fn record_destination_pass(destination: &str, clean: bool, duration: Duration) {
    let status = if clean { "clean" } else { "partial" };
    counter!(
        "replication_destination_passes_total",
        "destination" => destination.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "replication_destination_pass_duration_seconds",
        "destination" => destination.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a finished run.
pub fn record_run(success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!("replication_runs_total", "status" => status).increment(1);
    histogram!("replication_run_duration_seconds").record(duration.as_secs_f64());
}

/// Gauge for engine state.
pub fn set_engine_state(state: &str) {
    let value = match state {
        "Idle" => 0.0,
        "Running" => 1.0,
        "Completed" => 2.0,
        "Failed" => 3.0,
        _ => -1.0,
    };
    gauge!("replication_engine_state").set(value);
}
