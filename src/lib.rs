//! # Document Replicator
//!
//! One-to-many replication of a document database: every destination is
//! converged toward one authoritative source in a single pass.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              doc-replicator                               │
//! │                                                                           │
//! │                        ┌────────────────────┐                             │
//! │                        │ ReplicationEngine  │  one worker per destination │
//! │                        └─────────┬──────────┘  (bounded by a limiter)     │
//! │                 ┌────────────────┼────────────────┐                       │
//! │                 ▼                ▼                ▼                       │
//! │           ┌───────────┐    ┌───────────┐    ┌───────────┐                 │
//! │           │ upsert    │    │ upsert    │    │ upsert    │                 │
//! │           │ reconcile │    │ reconcile │    │ reconcile │                 │
//! │           └─────┬─────┘    └─────┬─────┘    └─────┬─────┘                 │
//! │                 ▼                ▼                ▼                       │
//! │           ReplicaStore     ReplicaStore     ReplicaStore                  │
//! │                                                                           │
//! │      SourceStore (read-only, shared by every worker)                      │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two-Phase Pass
//!
//! 1. **Upsert**: every source document is written to the destination with a
//!    full replace keyed by `_id`
//! 2. **Reconcile**: destination-only collections are dropped and
//!    destination-only documents are deleted
//!
//! Each collection is processed either *materialized* (loaded into memory) or
//! *streamed* (one item at a time), chosen from its source document count.
//! See [`strategy`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use doc_replicator::config::SyncSettings;
//! use doc_replicator::store::MemoryStore;
//! use doc_replicator::ReplicationEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> doc_replicator::Result<()> {
//!     let source = Arc::new(MemoryStore::new("sales@source"));
//!     let replicas = vec![Arc::new(MemoryStore::new("sales@replica-a"))];
//!
//!     let engine = ReplicationEngine::new(SyncSettings::default(), source, replicas)?;
//!     let report = engine.run().await?;
//!     println!("{} documents deleted", report.documents_deleted());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod resilience;
pub mod store;
pub mod strategy;

// Re-exports for convenience
pub use config::{ConnectConfig, DestinationConfig, ReplicationConfig, SourceConfig, SyncSettings};
pub use coordinator::{
    CollectionFailure, DeletionStats, DestinationReport, EngineState, Phase, ReplicationEngine,
    SyncReport, UpsertStats,
};
pub use error::{ReplicationError, Result};
pub use store::{
    CollectionReader, DocumentId, MemoryStore, MongoReplica, MongoSource, ReplicaStore,
    SourceStore, UpsertOutcome,
};
pub use strategy::{Strategy, StrategyPolicy};
