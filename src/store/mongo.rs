// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! MongoDB-backed stores.
//!
//! [`MongoSource`] exposes only the read operations of [`SourceStore`], so the
//! source database cannot be written through this crate. [`MongoReplica`] adds
//! the writes needed to converge one destination.
//!
//! | Operation | Driver call |
//! |-----------|-------------|
//! | `list_collections` | `listCollections` (names only) |
//! | `count_documents` | `countDocuments({})` |
//! | `find_documents` | `find({})` |
//! | `find_ids` | `find({}, {_id: 1})` |
//! | `contains_id` | `countDocuments({_id}, limit 1)` |
//! | `upsert` | `replaceOne({_id}, doc, upsert)` |
//! | `delete` | `deleteOne({_id})` |
//! | `drop_collection` | `drop` |

use super::{
    BoxFuture, CollectionReader, DocumentId, DocumentStream, IdStream, ReplicaStore, SourceStore,
    UpsertOutcome, ID_FIELD,
};
use crate::connection::{self, redact_uri};
use crate::error::{ReplicationError, Result};
use crate::resilience::RetryConfig;
use futures::StreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection, Database};

/// Shared read half of both store kinds.
#[derive(Clone)]
struct MongoDatabase {
    identity: String,
    database: Database,
}

impl MongoDatabase {
    fn new(client: &Client, database: &str, label: &str) -> Self {
        Self {
            identity: format!("{}@{}", database, label),
            database: client.database(database),
        }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }

    fn err(
        &self,
        operation: &str,
        collection: &str,
        source: mongodb::error::Error,
    ) -> ReplicationError {
        ReplicationError::store(
            format!("{} {}", operation, collection),
            self.identity.clone(),
            source,
        )
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.database
            .list_collection_names()
            .await
            .map_err(|e| ReplicationError::store("list_collection_names", self.identity.clone(), e))
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        self.collection(collection)
            .count_documents(doc! {})
            .await
            .map_err(|e| self.err("count_documents", collection, e))
    }

    async fn find_ids(&self, collection: &str) -> Result<IdStream> {
        let cursor = self
            .collection(collection)
            .find(doc! {})
            .projection(doc! { ID_FIELD: 1 })
            .await
            .map_err(|e| self.err("find_ids", collection, e))?;

        let identity = self.identity.clone();
        let collection = collection.to_string();
        Ok(cursor
            .map(move |next| {
                let document = next.map_err(|e| {
                    ReplicationError::store(format!("find_ids {}", collection), identity.clone(), e)
                })?;
                DocumentId::from_document(&collection, &document)
            })
            .boxed())
    }
}

/// Read-only handle on the source database.
#[derive(Clone)]
pub struct MongoSource {
    inner: MongoDatabase,
}

impl MongoSource {
    /// Wrap an existing client.
    ///
    /// `label` names the server in logs; pass a redacted address or an alias.
    pub fn new(client: &Client, database: &str, label: &str) -> Self {
        Self {
            inner: MongoDatabase::new(client, database, label),
        }
    }

    /// Connect with retries and wrap the resulting client.
    pub async fn connect(uri: &str, database: &str, retry: &RetryConfig) -> Result<Self> {
        let client = connection::connect(uri, retry).await?;
        Ok(Self::new(&client, database, &redact_uri(uri)))
    }
}

impl CollectionReader for MongoSource {
    fn identity(&self) -> &str {
        &self.inner.identity
    }

    fn list_collections(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(self.inner.list_collections())
    }

    fn count_documents(&self, collection: &str) -> BoxFuture<'_, u64> {
        let collection = collection.to_string();
        Box::pin(async move { self.inner.count_documents(&collection).await })
    }

    fn find_ids(&self, collection: &str) -> BoxFuture<'_, IdStream> {
        let collection = collection.to_string();
        Box::pin(async move { self.inner.find_ids(&collection).await })
    }
}

impl SourceStore for MongoSource {
    fn find_documents(&self, collection: &str) -> BoxFuture<'_, DocumentStream> {
        let collection = collection.to_string();
        Box::pin(async move {
            let cursor = self
                .inner
                .collection(&collection)
                .find(doc! {})
                .await
                .map_err(|e| self.inner.err("find", &collection, e))?;

            let identity = self.inner.identity.clone();
            Ok(cursor
                .map(move |next| {
                    next.map_err(|e| {
                        ReplicationError::store(format!("find {}", collection), identity.clone(), e)
                    })
                })
                .boxed())
        })
    }

    fn contains_id(&self, collection: &str, id: &DocumentId) -> BoxFuture<'_, bool> {
        let collection = collection.to_string();
        let filter = id.filter();
        Box::pin(async move {
            let count = self
                .inner
                .collection(&collection)
                .count_documents(filter)
                .limit(1)
                .await
                .map_err(|e| self.inner.err("contains_id", &collection, e))?;
            Ok(count > 0)
        })
    }
}

/// Read/write handle on one destination database.
#[derive(Clone)]
pub struct MongoReplica {
    inner: MongoDatabase,
}

impl MongoReplica {
    /// Wrap an existing client.
    pub fn new(client: &Client, database: &str, label: &str) -> Self {
        Self {
            inner: MongoDatabase::new(client, database, label),
        }
    }

    /// Connect with retries and wrap the resulting client.
    ///
    /// `label` defaults to the redacted URI when `None`.
    pub async fn connect(
        uri: &str,
        database: &str,
        label: Option<&str>,
        retry: &RetryConfig,
    ) -> Result<Self> {
        let client = connection::connect(uri, retry).await?;
        let label = label.map(str::to_string).unwrap_or_else(|| redact_uri(uri));
        Ok(Self::new(&client, database, &label))
    }
}

impl CollectionReader for MongoReplica {
    fn identity(&self) -> &str {
        &self.inner.identity
    }

    fn list_collections(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(self.inner.list_collections())
    }

    fn count_documents(&self, collection: &str) -> BoxFuture<'_, u64> {
        let collection = collection.to_string();
        Box::pin(async move { self.inner.count_documents(&collection).await })
    }

    fn find_ids(&self, collection: &str) -> BoxFuture<'_, IdStream> {
        let collection = collection.to_string();
        Box::pin(async move { self.inner.find_ids(&collection).await })
    }
}

impl ReplicaStore for MongoReplica {
    fn upsert(&self, collection: &str, document: Document) -> BoxFuture<'_, UpsertOutcome> {
        let collection = collection.to_string();
        Box::pin(async move {
            let id = DocumentId::from_document(&collection, &document)?;
            let result = self
                .inner
                .collection(&collection)
                .replace_one(id.filter(), document)
                .upsert(true)
                .await
                .map_err(|e| self.inner.err("replace_one", &collection, e))?;

            Ok(if result.upserted_id.is_some() {
                UpsertOutcome::Inserted
            } else if result.modified_count > 0 {
                UpsertOutcome::Replaced
            } else {
                UpsertOutcome::Unchanged
            })
        })
    }

    fn delete(&self, collection: &str, id: &DocumentId) -> BoxFuture<'_, bool> {
        let collection = collection.to_string();
        let filter = id.filter();
        Box::pin(async move {
            let result = self
                .inner
                .collection(&collection)
                .delete_one(filter)
                .await
                .map_err(|e| self.inner.err("delete_one", &collection, e))?;
            Ok(result.deleted_count > 0)
        })
    }

    fn drop_collection(&self, collection: &str) -> BoxFuture<'_, ()> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.inner
                .collection(&collection)
                .drop()
                .await
                .map_err(|e| self.inner.err("drop", &collection, e))
        })
    }
}
