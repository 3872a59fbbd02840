//! Engine state and run report types.
//!
//! # State Transitions
//!
//! ```text
//!           run()                     all workers joined
//! Idle ───────────────→ Running ─────────────────────────→ Completed
//!   ↑                      │                                   │
//!   │                      │ (non-isolated error)              │
//!   │                      ↓                                   │
//!   │                   Failed                                 │
//!   │                      │                                   │
//!   └──────────────────────┴────────── run() again ────────────┘
//! ```
//!
//! # State Descriptions
//!
//! - **Idle**: Initial state after `ReplicationEngine::new()`. No pass has run.
//! - **Running**: `run()` called, destination workers in flight.
//! - **Completed**: The last pass finished. Isolated failures may still be in the report.
//! - **Failed**: The last pass ended with a non-isolated error.

use crate::error::ReplicationError;
use crate::store::UpsertOutcome;
use crate::strategy::Strategy;
use std::time::Duration;

/// State of the replication engine.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Engine created, no pass started yet.
    Idle,

    /// A pass is in progress.
    ///
    /// Calling [`run()`](super::ReplicationEngine::run) again in this state
    /// is rejected.
    Running,

    /// The last pass returned a report.
    Completed,

    /// The last pass ended with a non-isolated error.
    ///
    /// The engine may be run again.
    Failed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Running => write!(f, "Running"),
            EngineState::Completed => write!(f, "Completed"),
            EngineState::Failed => write!(f, "Failed"),
        }
    }
}

/// The two phases of a destination pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Copy source documents into the destination.
    Upsert,
    /// Remove destination-only collections and documents.
    Reconcile,
}

impl Phase {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Upsert => "upsert",
            Phase::Reconcile => "reconcile",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of upserting one collection into one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertStats {
    pub collection: String,
    pub strategy: Strategy,
    /// Documents read from the source and written.
    pub documents: u64,
    pub inserted: u64,
    pub replaced: u64,
    pub unchanged: u64,
}

impl UpsertStats {
    pub fn new(collection: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            collection: collection.into(),
            strategy,
            documents: 0,
            inserted: 0,
            replaced: 0,
            unchanged: 0,
        }
    }

    /// Account for one write.
    pub fn record(&mut self, outcome: UpsertOutcome) {
        self.documents += 1;
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Replaced => self.replaced += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Writes that changed destination state.
    pub fn changed(&self) -> u64 {
        self.inserted + self.replaced
    }
}

/// Result of reconciling documents of one collection in one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionStats {
    pub collection: String,
    pub strategy: Strategy,
    pub source_count: u64,
    pub destination_count: u64,
    /// Destination ids examined.
    pub checked: u64,
    pub deleted: u64,
}

impl DeletionStats {
    pub fn new(
        collection: impl Into<String>,
        strategy: Strategy,
        source_count: u64,
        destination_count: u64,
    ) -> Self {
        Self {
            collection: collection.into(),
            strategy,
            source_count,
            destination_count,
            checked: 0,
            deleted: 0,
        }
    }
}

/// An isolated failure caught during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFailure {
    pub phase: Phase,
    /// `None` when the failure hit the phase as a whole (e.g. listing collections).
    pub collection: Option<String>,
    pub error: String,
}

impl CollectionFailure {
    pub fn new(phase: Phase, collection: Option<&str>, error: &ReplicationError) -> Self {
        Self {
            phase,
            collection: collection.map(str::to_string),
            error: error.to_string(),
        }
    }
}

/// Everything the reconciliation phase did to one destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Destination-only collections that were dropped.
    pub dropped: Vec<String>,
    /// Per-collection document reconciliation.
    pub collections: Vec<DeletionStats>,
    pub failures: Vec<CollectionFailure>,
}

/// Result of one destination pass.
#[derive(Debug, Clone)]
pub struct DestinationReport {
    pub destination: String,
    pub upserts: Vec<UpsertStats>,
    pub deletions: Vec<DeletionStats>,
    pub dropped: Vec<String>,
    pub failures: Vec<CollectionFailure>,
    pub duration: Duration,
}

impl DestinationReport {
    /// Total documents written (including unchanged rewrites).
    pub fn documents_upserted(&self) -> u64 {
        self.upserts.iter().map(|s| s.documents).sum()
    }

    /// Total documents deleted.
    pub fn documents_deleted(&self) -> u64 {
        self.deletions.iter().map(|s| s.deleted).sum()
    }

    /// Whether the pass finished without any isolated failure.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Stats for one collection's upsert, if it was copied.
    pub fn upsert_for(&self, collection: &str) -> Option<&UpsertStats> {
        self.upserts.iter().find(|s| s.collection == collection)
    }

    /// Stats for one collection's reconciliation, if it was reconciled.
    pub fn deletion_for(&self, collection: &str) -> Option<&DeletionStats> {
        self.deletions.iter().find(|s| s.collection == collection)
    }
}

/// Result of a full pass over every destination.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// One entry per destination, in configuration order.
    pub destinations: Vec<DestinationReport>,
    pub duration: Duration,
}

impl SyncReport {
    pub fn documents_upserted(&self) -> u64 {
        self.destinations.iter().map(|d| d.documents_upserted()).sum()
    }

    pub fn documents_deleted(&self) -> u64 {
        self.destinations.iter().map(|d| d.documents_deleted()).sum()
    }

    pub fn collections_dropped(&self) -> usize {
        self.destinations.iter().map(|d| d.dropped.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.destinations.iter().map(|d| d.failures.len()).sum()
    }

    /// Report for one destination by identity.
    pub fn destination(&self, identity: &str) -> Option<&DestinationReport> {
        self.destinations.iter().find(|d| d.destination == identity)
    }
}
