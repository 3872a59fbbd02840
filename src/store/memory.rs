// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process document store.
//!
//! [`MemoryStore`] implements both [`SourceStore`] and [`ReplicaStore`] over
//! a map of collections. It backs the test suites and can stand in for a
//! real database when embedding the engine.
//!
//! Only writes that change state are counted as mutations, so an idempotent
//! run can be observed with [`MemoryStore::mutation_count()`].

use super::{
    BoxFuture, CollectionReader, DocumentId, DocumentStream, IdStream, ReplicaStore, SourceStore,
    UpsertOutcome,
};
use crate::error::Result;
use futures::StreamExt;
use mongodb::bson::Document;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

type Collections = BTreeMap<String, BTreeMap<DocumentId, Document>>;

/// A document store held entirely in memory.
pub struct MemoryStore {
    identity: String,
    collections: RwLock<Collections>,
    mutations: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            collections: RwLock::new(BTreeMap::new()),
            mutations: AtomicU64::new(0),
        }
    }

    /// Create a collection with no documents (no-op if it exists).
    pub async fn create_collection(&self, collection: &str) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default();
    }

    /// Insert or overwrite a document directly, bypassing mutation accounting.
    pub async fn insert(&self, collection: &str, document: Document) -> Result<()> {
        let id = DocumentId::from_document(collection, &document)?;
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);
        Ok(())
    }

    /// Fetch one document.
    pub async fn get(&self, collection: &str, id: &DocumentId) -> Option<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Ids in a collection, in id order.
    pub async fn ids(&self, collection: &str) -> Vec<DocumentId> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a collection exists.
    pub async fn has_collection(&self, collection: &str) -> bool {
        self.collections.read().await.contains_key(collection)
    }

    /// A full copy of the store's contents.
    pub async fn snapshot(&self) -> BTreeMap<String, BTreeMap<DocumentId, Document>> {
        self.collections.read().await.clone()
    }

    /// Number of state-changing writes performed through [`ReplicaStore`].
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

impl CollectionReader for MemoryStore {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn list_collections(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.collections.read().await.keys().cloned().collect()) })
    }

    fn count_documents(&self, collection: &str) -> BoxFuture<'_, u64> {
        let collection = collection.to_string();
        Box::pin(async move {
            Ok(self
                .collections
                .read()
                .await
                .get(&collection)
                .map(|docs| docs.len() as u64)
                .unwrap_or(0))
        })
    }

    fn find_ids(&self, collection: &str) -> BoxFuture<'_, IdStream> {
        let collection = collection.to_string();
        Box::pin(async move {
            let ids = self.ids(&collection).await;
            Ok(futures::stream::iter(ids.into_iter().map(Ok)).boxed())
        })
    }
}

impl SourceStore for MemoryStore {
    fn find_documents(&self, collection: &str) -> BoxFuture<'_, DocumentStream> {
        let collection = collection.to_string();
        Box::pin(async move {
            let docs: Vec<Document> = self
                .collections
                .read()
                .await
                .get(&collection)
                .map(|docs| docs.values().cloned().collect())
                .unwrap_or_default();
            Ok(futures::stream::iter(docs.into_iter().map(Ok)).boxed())
        })
    }

    fn contains_id(&self, collection: &str, id: &DocumentId) -> BoxFuture<'_, bool> {
        let collection = collection.to_string();
        let id = id.clone();
        Box::pin(async move {
            Ok(self
                .collections
                .read()
                .await
                .get(&collection)
                .is_some_and(|docs| docs.contains_key(&id)))
        })
    }
}

impl ReplicaStore for MemoryStore {
    fn upsert(&self, collection: &str, document: Document) -> BoxFuture<'_, UpsertOutcome> {
        let collection = collection.to_string();
        Box::pin(async move {
            let id = DocumentId::from_document(&collection, &document)?;
            let mut collections = self.collections.write().await;
            let docs = collections.entry(collection).or_default();

            let outcome = match docs.get(&id) {
                Some(existing) if *existing == document => return Ok(UpsertOutcome::Unchanged),
                Some(_) => UpsertOutcome::Replaced,
                None => UpsertOutcome::Inserted,
            };
            // Re-key so the stored id carries the new document's `_id` type.
            docs.remove(&id);
            docs.insert(id, document);
            self.record_mutation();
            Ok(outcome)
        })
    }

    fn delete(&self, collection: &str, id: &DocumentId) -> BoxFuture<'_, bool> {
        let collection = collection.to_string();
        let id = id.clone();
        Box::pin(async move {
            let removed = self
                .collections
                .write()
                .await
                .get_mut(&collection)
                .and_then(|docs| docs.remove(&id))
                .is_some();
            if removed {
                self.record_mutation();
            }
            Ok(removed)
        })
    }

    fn drop_collection(&self, collection: &str) -> BoxFuture<'_, ()> {
        let collection = collection.to_string();
        Box::pin(async move {
            if self.collections.write().await.remove(&collection).is_some() {
                self.record_mutation();
            }
            Ok(())
        })
    }
}
