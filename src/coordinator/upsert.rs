// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Upsert phase: converge destination collections toward source content.
//!
//! For each non-reserved, non-empty source collection, every source document
//! is written to the destination with a full replace keyed by `_id`. After a
//! successful pass the destination holds identical content at every source id.
//!
//! # Failure Isolation
//!
//! A failure inside one collection (count, read or write) is logged with the
//! source, destination and collection, recorded in the phase result, and the
//! next collection is processed. The failed collection may be partially
//! written; the next run starts it over from scratch.

use super::types::{CollectionFailure, Phase, UpsertStats};
use crate::error::Result;
use crate::metrics;
use crate::store::{is_reserved, ReplicaStore, SourceStore};
use crate::strategy::{traverse, StrategyPolicy};
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Copy every non-reserved source collection into one destination.
///
/// Isolated errors are caught per collection (or for the whole phase when the
/// source cannot be listed) and returned alongside the stats. Non-isolated
/// errors abort the phase.
pub async fn sync_collections<S: SourceStore, R: ReplicaStore>(
    source: &S,
    replica: &R,
    policy: &StrategyPolicy,
    reserved_prefix: &str,
) -> Result<(Vec<UpsertStats>, Vec<CollectionFailure>)> {
    let mut copied = Vec::new();
    let mut failures = Vec::new();

    let collections = match source.list_collections().await {
        Ok(collections) => collections,
        Err(e) if e.is_isolated() => {
            error!(
                source = %source.identity(),
                destination = %replica.identity(),
                error = %e,
                "Failed to list source collections, skipping upsert phase"
            );
            metrics::record_collection_failure(replica.identity(), Phase::Upsert.as_str());
            failures.push(CollectionFailure::new(Phase::Upsert, None, &e));
            return Ok((copied, failures));
        }
        Err(e) => return Err(e),
    };

    info!(
        source = %source.identity(),
        destination = %replica.identity(),
        collections = collections.len(),
        "Starting upsert phase"
    );

    for collection in collections {
        if is_reserved(&collection, reserved_prefix) {
            debug!(collection = %collection, "Skipping reserved collection");
            continue;
        }

        match upsert_collection(source, replica, &collection, policy).await {
            Ok(Some(stats)) => {
                metrics::record_collection_upserted(replica.identity(), &stats);
                copied.push(stats);
            }
            Ok(None) => {
                debug!(collection = %collection, "Skipping empty source collection");
            }
            Err(e) if e.is_isolated() => {
                error!(
                    source = %source.identity(),
                    destination = %replica.identity(),
                    collection = %collection,
                    error = %e,
                    "Failed to upsert collection"
                );
                metrics::record_collection_failure(replica.identity(), Phase::Upsert.as_str());
                failures.push(CollectionFailure::new(Phase::Upsert, Some(collection.as_str()), &e));
            }
            Err(e) => return Err(e),
        }
    }

    Ok((copied, failures))
}

/// Copy one source collection into the destination.
///
/// Returns `None` when the source collection holds no documents. Otherwise
/// the strategy is chosen from the source count and every document is
/// upserted by `_id`.
#[instrument(skip_all, fields(collection = %collection))]
pub async fn upsert_collection<S: SourceStore, R: ReplicaStore>(
    source: &S,
    replica: &R,
    collection: &str,
    policy: &StrategyPolicy,
) -> Result<Option<UpsertStats>> {
    let count = source.count_documents(collection).await?;
    if count == 0 {
        return Ok(None);
    }

    let strategy = policy.choose(count);
    metrics::record_strategy(replica.identity(), Phase::Upsert.as_str(), strategy);
    debug!(source_count = count, strategy = %strategy, "Processing collection");

    let start = Instant::now();
    let documents = source.find_documents(collection).await?;
    let stats = traverse(
        strategy,
        documents,
        UpsertStats::new(collection, strategy),
        |mut stats, document| async move {
            let outcome = replica.upsert(collection, document).await?;
            stats.record(outcome);
            Ok(stats)
        },
    )
    .await?;

    info!(
        collection = %collection,
        strategy = %strategy,
        source_count = count,
        documents = stats.documents,
        inserted = stats.inserted,
        replaced = stats.replaced,
        unchanged = stats.unchanged,
        duration_ms = start.elapsed().as_millis(),
        "Upserted collection"
    );

    Ok(Some(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentId, MemoryStore, DEFAULT_RESERVED_PREFIX};
    use crate::strategy::Strategy;
    use mongodb::bson::doc;
    use std::num::NonZeroU64;

    async fn source_with_orders() -> MemoryStore {
        let source = MemoryStore::new("sales@source");
        for id in 1..=3 {
            source
                .insert("orders", doc! { "_id": id, "total": id * 10 })
                .await
                .unwrap();
        }
        source
    }

    #[tokio::test]
    async fn test_upsert_collection_copies_all() {
        let source = source_with_orders().await;
        let replica = MemoryStore::new("sales@replica");

        let stats = upsert_collection(&source, &replica, "orders", &StrategyPolicy::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.documents, 3);
        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.strategy, Strategy::Materialize);
        assert_eq!(
            replica.get("orders", &DocumentId::of(2)).await,
            Some(doc! { "_id": 2, "total": 20 })
        );
    }

    #[tokio::test]
    async fn test_upsert_collection_empty_is_skipped() {
        let source = MemoryStore::new("sales@source");
        source.create_collection("empty").await;
        let replica = MemoryStore::new("sales@replica");

        let stats = upsert_collection(&source, &replica, "empty", &StrategyPolicy::default())
            .await
            .unwrap();

        assert!(stats.is_none());
        assert!(!replica.has_collection("empty").await);
    }

    #[tokio::test]
    async fn test_upsert_collection_uses_stream_above_threshold() {
        let source = source_with_orders().await;
        let replica = MemoryStore::new("sales@replica");
        let policy = StrategyPolicy::new(NonZeroU64::new(2).unwrap());

        let stats = upsert_collection(&source, &replica, "orders", &policy)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.strategy, Strategy::Stream);
        assert_eq!(stats.inserted, 3);
    }

    #[tokio::test]
    async fn test_upsert_collection_replaces_changed() {
        let source = source_with_orders().await;
        let replica = MemoryStore::new("sales@replica");
        replica
            .insert("orders", doc! { "_id": 1, "total": 999, "stale": true })
            .await
            .unwrap();
        replica.insert("orders", doc! { "_id": 2, "total": 20 }).await.unwrap();

        let stats = upsert_collection(&source, &replica, "orders", &StrategyPolicy::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.replaced, 1);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(
            replica.get("orders", &DocumentId::of(1)).await,
            Some(doc! { "_id": 1, "total": 10 })
        );
    }

    #[tokio::test]
    async fn test_sync_collections_skips_reserved() {
        let source = source_with_orders().await;
        source
            .insert("system.views", doc! { "_id": "v1", "viewOn": "orders" })
            .await
            .unwrap();
        let replica = MemoryStore::new("sales@replica");

        let (copied, failures) = sync_collections(
            &source,
            &replica,
            &StrategyPolicy::default(),
            DEFAULT_RESERVED_PREFIX,
        )
        .await
        .unwrap();

        assert!(failures.is_empty());
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].collection, "orders");
        assert!(!replica.has_collection("system.views").await);
    }

    #[tokio::test]
    async fn test_sync_collections_second_run_unchanged() {
        let source = source_with_orders().await;
        let replica = MemoryStore::new("sales@replica");
        let policy = StrategyPolicy::default();

        sync_collections(&source, &replica, &policy, DEFAULT_RESERVED_PREFIX)
            .await
            .unwrap();
        let mutations = replica.mutation_count();

        let (copied, failures) =
            sync_collections(&source, &replica, &policy, DEFAULT_RESERVED_PREFIX)
                .await
                .unwrap();

        assert!(failures.is_empty());
        assert_eq!(copied[0].unchanged, 3);
        assert_eq!(copied[0].changed(), 0);
        assert_eq!(replica.mutation_count(), mutations);
    }
}
