// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine coordinator.
//!
//! The orchestrator that ties together:
//! - The read-only source via [`crate::store::SourceStore`]
//! - One [`crate::store::ReplicaStore`] per destination
//! - The upsert phase ([`upsert`]) and the reconciliation phase ([`reconcile`])
//!
//! # Architecture
//!
//! A call to [`ReplicationEngine::run()`] performs exactly one pass:
//! 1. Spawns one worker per destination, bounded by a [`DestinationLimiter`]
//! 2. Each worker runs the upsert phase, then the reconciliation phase
//! 3. Joins every worker before returning a [`SyncReport`]
//!
//! Workers share nothing mutable. The source is only read, and each worker
//! owns its destination.
//!
//! # Failure Handling
//!
//! Isolated errors are caught inside the phases and show up in the report.
//! A non-isolated error ends that destination's worker; the other workers
//! still run to completion, then the first such error is returned and the
//! engine moves to [`EngineState::Failed`]. A panicking worker is reported
//! as [`ReplicationError::Internal`].

pub mod reconcile;
mod types;
pub mod upsert;

pub use types::{
    CollectionFailure, DeletionStats, DestinationReport, EngineState, Phase, ReconcileOutcome,
    SyncReport, UpsertStats,
};

use crate::config::SyncSettings;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::resilience::DestinationLimiter;
use crate::store::{ReplicaStore, SourceStore};
use crate::strategy::StrategyPolicy;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, Instrument};

/// The replication engine.
///
/// Converges every destination toward the source, one pass per
/// [`run()`](Self::run). Scheduling repeated passes is up to the caller.
///
/// Stores are shared through `Arc` so each destination worker can run on
/// its own task.
pub struct ReplicationEngine<S: SourceStore, R: ReplicaStore> {
    /// Validated settings
    settings: SyncSettings,

    /// Strategy policy derived from settings
    policy: StrategyPolicy,

    /// The authoritative store (read-only)
    source: Arc<S>,

    /// Destination stores, in configuration order
    destinations: Vec<Arc<R>>,

    /// Bounds concurrent destination workers
    limiter: Arc<DestinationLimiter>,

    /// Engine state (broadcast to watchers)
    state_tx: watch::Sender<EngineState>,

    /// Engine state receiver (for internal use)
    state_rx: watch::Receiver<EngineState>,
}

impl<S: SourceStore, R: ReplicaStore> ReplicationEngine<S, R> {
    /// Create an engine over connected stores.
    ///
    /// The engine starts in `Idle` state. Fails with a configuration error
    /// if the settings are invalid or no destination is given.
    pub fn new(settings: SyncSettings, source: Arc<S>, destinations: Vec<Arc<R>>) -> Result<Self> {
        settings.validate()?;
        if destinations.is_empty() {
            return Err(ReplicationError::Config(
                "at least one destination is required".to_string(),
            ));
        }

        let policy = settings.policy()?;
        let limiter = Arc::new(DestinationLimiter::new(settings.max_concurrent_destinations));
        let (state_tx, state_rx) = watch::channel(EngineState::Idle);

        Ok(Self {
            settings,
            policy,
            source,
            destinations,
            limiter,
            state_tx,
            state_rx,
        })
    }

    /// Get current engine state.
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Check if a pass is in progress.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), EngineState::Running)
    }

    /// The settings this engine was built with.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// The source store.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// The destination stores.
    pub fn destinations(&self) -> &[Arc<R>] {
        &self.destinations
    }

    /// Run one full pass over every destination.
    ///
    /// Returns once every destination worker has finished.
    pub async fn run(&self) -> Result<SyncReport> {
        self.begin()?;

        let start = Instant::now();
        info!(
            source = %self.source.identity(),
            destinations = self.destinations.len(),
            max_concurrent = self.limiter.max_concurrent(),
            "Starting replication run"
        );

        let mut handles = Vec::with_capacity(self.destinations.len());
        for replica in &self.destinations {
            let identity = replica.identity().to_string();
            let span = tracing::info_span!("destination", destination = %identity);

            let source = Arc::clone(&self.source);
            let replica = Arc::clone(replica);
            let limiter = Arc::clone(&self.limiter);
            let policy = self.policy;
            let reserved_prefix = self.settings.reserved_prefix.clone();

            let handle = tokio::spawn(
                async move {
                    let _slot = limiter
                        .admit(replica.identity())
                        .await
                        .map_err(|e| ReplicationError::Internal(e.to_string()))?;
                    sync_destination(source.as_ref(), replica.as_ref(), &policy, &reserved_prefix)
                        .await
                }
                .instrument(span),
            );
            handles.push((identity, handle));
        }

        let mut destinations = Vec::with_capacity(handles.len());
        let mut first_error: Option<ReplicationError> = None;

        for (identity, handle) in handles {
            let failure = match handle.await {
                Ok(Ok(report)) => {
                    destinations.push(report);
                    continue;
                }
                Ok(Err(e)) => {
                    error!(destination = %identity, error = %e, "Destination pass aborted");
                    e
                }
                Err(join_error) => {
                    error!(
                        destination = %identity,
                        error = %join_error,
                        "Destination worker panicked"
                    );
                    ReplicationError::Internal(format!(
                        "worker for {} did not complete: {}",
                        identity, join_error
                    ))
                }
            };
            if first_error.is_none() {
                first_error = Some(failure);
            }
        }

        let duration = start.elapsed();

        if let Some(e) = first_error {
            self.set_state(EngineState::Failed);
            metrics::record_run(false, duration);
            error!(
                completed = destinations.len(),
                total = self.destinations.len(),
                duration_ms = duration.as_millis(),
                error = %e,
                "Replication run failed"
            );
            return Err(e);
        }

        let report = SyncReport {
            destinations,
            duration,
        };

        self.set_state(EngineState::Completed);
        metrics::record_run(true, duration);
        info!(
            destinations = report.destinations.len(),
            documents_upserted = report.documents_upserted(),
            documents_deleted = report.documents_deleted(),
            collections_dropped = report.collections_dropped(),
            failures = report.failure_count(),
            duration_ms = duration.as_millis(),
            "Replication run complete"
        );

        Ok(report)
    }

    /// Move to `Running`, rejecting a second concurrent pass.
    fn begin(&self) -> Result<()> {
        let mut rejected = false;
        self.state_tx.send_if_modified(|state| {
            if *state == EngineState::Running {
                rejected = true;
                false
            } else {
                *state = EngineState::Running;
                true
            }
        });

        if rejected {
            return Err(ReplicationError::InvalidState {
                expected: "Idle, Completed or Failed".to_string(),
                actual: EngineState::Running.to_string(),
            });
        }
        metrics::set_engine_state("Running");
        Ok(())
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state_tx.send(state);
        metrics::set_engine_state(&state.to_string());
    }
}

impl<S: SourceStore, R: ReplicaStore> Drop for ReplicationEngine<S, R> {
    /// Workers still waiting for a slot give up instead of starting a pass
    /// nobody will collect.
    fn drop(&mut self) {
        self.limiter.close();
    }
}

/// Upsert then reconcile one destination.
async fn sync_destination<S: SourceStore, R: ReplicaStore>(
    source: &S,
    replica: &R,
    policy: &StrategyPolicy,
    reserved_prefix: &str,
) -> Result<DestinationReport> {
    let start = Instant::now();

    let (upserts, mut failures) =
        upsert::sync_collections(source, replica, policy, reserved_prefix).await?;
    let reconciled = reconcile::reconcile(source, replica, policy, reserved_prefix).await?;
    failures.extend(reconciled.failures);

    let report = DestinationReport {
        destination: replica.identity().to_string(),
        upserts,
        deletions: reconciled.collections,
        dropped: reconciled.dropped,
        failures,
        duration: start.elapsed(),
    };

    metrics::record_destination_pass(replica.identity(), report.is_clean(), report.duration);
    info!(
        collections_upserted = report.upserts.len(),
        documents_upserted = report.documents_upserted(),
        documents_deleted = report.documents_deleted(),
        collections_dropped = report.dropped.len(),
        failures = report.failures.len(),
        duration_ms = report.duration.as_millis(),
        "Destination pass complete"
    );

    Ok(report)
}
