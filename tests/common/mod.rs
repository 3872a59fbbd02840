//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - MongoDB testcontainer setup
//! - A recording, fault-injecting store
//! - Fixture helpers

#![allow(dead_code)]

pub mod containers;
pub mod faulty_store;

pub use containers::*;
pub use faulty_store::*;

use doc_replicator::store::{DocumentId, MemoryStore};
use mongodb::bson::{doc, Document};
use std::collections::BTreeMap;

/// Seed a collection with `{_id, n}` documents for each id.
pub async fn seed(store: &MemoryStore, collection: &str, ids: impl IntoIterator<Item = i64>) {
    store.create_collection(collection).await;
    for id in ids {
        store
            .insert(collection, doc! { "_id": id, "n": id, "label": format!("doc-{}", id) })
            .await
            .expect("seed insert");
    }
}

/// Content of every non-reserved collection, for whole-store comparison.
pub async fn contents(store: &MemoryStore) -> BTreeMap<String, BTreeMap<DocumentId, Document>> {
    store
        .snapshot()
        .await
        .into_iter()
        .filter(|(name, _)| !name.starts_with("system."))
        .collect()
}

/// Assert a replica holds exactly the source's non-reserved data.
pub async fn assert_converged(source: &MemoryStore, replica: &MemoryStore) {
    assert_eq!(
        contents(source).await,
        contents(replica).await,
        "replica {} diverges from source",
        doc_replicator::store::CollectionReader::identity(replica)
    );
}
