// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconciliation phase: remove destination data that the source no longer has.
//!
//! # Algorithm
//!
//! 1. List collection names on both sides, reserved names excluded
//! 2. Drop every destination collection whose name is absent from the source
//! 3. For every name present on both sides:
//!    - count both sides and pick a strategy from the source count
//!    - build a [`SourceMembership`] for the collection
//!    - stream destination ids, deleting each id the source does not hold
//!
//! A collection that exists in the source with zero documents still takes
//! part in step 3, so every destination document in it is deleted.
//!
//! # Membership by Strategy
//!
//! | Strategy | Membership | Source queries |
//! |----------|------------|----------------|
//! | Materialize | `HashSet` of all source ids | one id scan |
//! | Stream | existence check per id | one per destination document |

use super::types::{CollectionFailure, DeletionStats, Phase, ReconcileOutcome};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::store::{is_reserved, CollectionReader, DocumentId, ReplicaStore, SourceStore};
use crate::strategy::{traverse, Strategy, StrategyPolicy};
use futures::TryStreamExt;
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Answers "does the source still hold this id?" for one collection.
#[derive(Debug)]
pub enum SourceMembership {
    /// Every source id, loaded up front.
    Materialized(HashSet<DocumentId>),
    /// Ask the source for each id.
    Remote,
}

impl SourceMembership {
    /// Build the membership test a strategy calls for.
    pub async fn build<S: SourceStore>(
        strategy: Strategy,
        source: &S,
        collection: &str,
    ) -> Result<Self> {
        match strategy {
            Strategy::Materialize => {
                let ids: HashSet<DocumentId> =
                    source.find_ids(collection).await?.try_collect().await?;
                Ok(SourceMembership::Materialized(ids))
            }
            Strategy::Stream => Ok(SourceMembership::Remote),
        }
    }

    /// Check whether the source holds `id` in `collection`.
    pub async fn contains<S: SourceStore>(
        &self,
        source: &S,
        collection: &str,
        id: &DocumentId,
    ) -> Result<bool> {
        match self {
            SourceMembership::Materialized(ids) => Ok(ids.contains(id)),
            SourceMembership::Remote => source.contains_id(collection, id).await,
        }
    }
}

/// Non-reserved collection names of one side.
async fn visible_collections<C: CollectionReader>(
    store: &C,
    reserved_prefix: &str,
) -> Result<BTreeSet<String>> {
    Ok(store
        .list_collections()
        .await?
        .into_iter()
        .filter(|name| !is_reserved(name, reserved_prefix))
        .collect())
}

/// Remove destination-only collections and documents from one destination.
///
/// A listing failure on either side ends the phase for this destination and
/// is reported as a phase-level failure. Drop and per-collection failures are
/// reported and skipped. Non-isolated errors abort the phase.
pub async fn reconcile<S: SourceStore, R: ReplicaStore>(
    source: &S,
    replica: &R,
    policy: &StrategyPolicy,
    reserved_prefix: &str,
) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();

    let listed = async {
        let source_names = visible_collections(source, reserved_prefix).await?;
        let destination_names = visible_collections(replica, reserved_prefix).await?;
        Ok::<_, ReplicationError>((source_names, destination_names))
    }
    .await;

    let (source_names, destination_names) = match listed {
        Ok(names) => names,
        Err(e) if e.is_isolated() => {
            error!(
                source = %source.identity(),
                destination = %replica.identity(),
                error = %e,
                "Failed to list collections, skipping reconciliation phase"
            );
            metrics::record_collection_failure(replica.identity(), Phase::Reconcile.as_str());
            outcome.failures.push(CollectionFailure::new(Phase::Reconcile, None, &e));
            return Ok(outcome);
        }
        Err(e) => return Err(e),
    };

    info!(
        source = %source.identity(),
        destination = %replica.identity(),
        source_collections = source_names.len(),
        destination_collections = destination_names.len(),
        "Starting reconciliation phase"
    );

    for collection in destination_names.difference(&source_names) {
        match replica.drop_collection(collection).await {
            Ok(()) => {
                info!(collection = %collection, "Dropped destination-only collection");
                metrics::record_collection_dropped(replica.identity());
                outcome.dropped.push(collection.clone());
            }
            Err(e) if e.is_isolated() => {
                error!(
                    destination = %replica.identity(),
                    collection = %collection,
                    error = %e,
                    "Failed to drop collection"
                );
                metrics::record_collection_failure(replica.identity(), Phase::Reconcile.as_str());
                outcome
                    .failures
                    .push(CollectionFailure::new(Phase::Reconcile, Some(collection.as_str()), &e));
            }
            Err(e) => return Err(e),
        }
    }

    for collection in destination_names.intersection(&source_names) {
        match reconcile_collection(source, replica, collection, policy).await {
            Ok(stats) => {
                metrics::record_documents_deleted(replica.identity(), collection, stats.deleted);
                outcome.collections.push(stats);
            }
            Err(e) if e.is_isolated() => {
                error!(
                    source = %source.identity(),
                    destination = %replica.identity(),
                    collection = %collection,
                    error = %e,
                    "Failed to reconcile collection"
                );
                metrics::record_collection_failure(replica.identity(), Phase::Reconcile.as_str());
                outcome
                    .failures
                    .push(CollectionFailure::new(Phase::Reconcile, Some(collection.as_str()), &e));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outcome)
}

/// Delete destination documents of one collection whose id the source lacks.
///
/// The strategy is chosen from the source count. Destination ids are always
/// streamed; only the membership test changes with the strategy.
#[instrument(skip_all, fields(collection = %collection))]
pub async fn reconcile_collection<S: SourceStore, R: ReplicaStore>(
    source: &S,
    replica: &R,
    collection: &str,
    policy: &StrategyPolicy,
) -> Result<DeletionStats> {
    let (source_count, destination_count) = tokio::try_join!(
        source.count_documents(collection),
        replica.count_documents(collection)
    )?;

    let strategy = policy.choose(source_count);
    metrics::record_strategy(replica.identity(), Phase::Reconcile.as_str(), strategy);
    debug!(
        source_count,
        destination_count,
        strategy = %strategy,
        "Reconciling collection"
    );

    let start = Instant::now();
    let membership = SourceMembership::build(strategy, source, collection).await?;
    let membership = &membership;
    let destination_ids = replica.find_ids(collection).await?;

    let stats = traverse(
        Strategy::Stream,
        destination_ids,
        DeletionStats::new(collection, strategy, source_count, destination_count),
        |mut stats, id| async move {
            stats.checked += 1;
            if !membership.contains(source, collection, &id).await? {
                if replica.delete(collection, &id).await? {
                    stats.deleted += 1;
                }
                debug!(id = %id, "Deleted destination-only document");
            }
            Ok(stats)
        },
    )
    .await?;

    info!(
        collection = %collection,
        strategy = %strategy,
        source_count,
        destination_count,
        checked = stats.checked,
        deleted = stats.deleted,
        duration_ms = start.elapsed().as_millis(),
        "Reconciled collection"
    );

    Ok(stats)
}
