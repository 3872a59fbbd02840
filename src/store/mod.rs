// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document store traits.
//!
//! Defines what the engines need from the source and from each replica:
//!
//! - [`CollectionReader`]: listing, counting and id scans, shared by both sides
//! - [`SourceStore`]: full document scans and point existence checks (read-only)
//! - [`ReplicaStore`]: upsert, delete and drop against one destination
//!
//! Two implementations ship with the crate: [`mongo`] for real deployments
//! and [`memory`] for embedding and tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use doc_replicator::store::{BoxFuture, CollectionReader, DocumentId, IdStream};
//! use futures::StreamExt;
//!
//! struct EmptyStore;
//!
//! impl CollectionReader for EmptyStore {
//!     fn identity(&self) -> &str {
//!         "empty@nowhere"
//!     }
//!
//!     fn list_collections(&self) -> BoxFuture<'_, Vec<String>> {
//!         Box::pin(async { Ok(vec![]) })
//!     }
//!
//!     fn count_documents(&self, _collection: &str) -> BoxFuture<'_, u64> {
//!         Box::pin(async { Ok(0) })
//!     }
//!
//!     fn find_ids(&self, _collection: &str) -> BoxFuture<'_, IdStream> {
//!         Box::pin(async { Ok(futures::stream::empty().boxed()) })
//!     }
//! }
//! ```

pub mod memory;
pub mod mongo;

use crate::error::{ReplicationError, Result};
use futures::stream::BoxStream;
use mongodb::bson::{doc, Bson, Document};
use std::cmp::Ordering;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;

pub use memory::MemoryStore;
pub use mongo::{MongoReplica, MongoSource};

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Stream of full documents from one collection.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Stream of document ids from one collection.
pub type IdStream = BoxStream<'static, Result<DocumentId>>;

/// Field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Default prefix of store-internal collections.
pub const DEFAULT_RESERVED_PREFIX: &str = "system.";

/// Check whether a collection name is reserved for the store's own use.
///
/// Reserved collections are never read, copied, counted, deleted or dropped.
pub fn is_reserved(collection: &str, reserved_prefix: &str) -> bool {
    collection.starts_with(reserved_prefix)
}

/// A document identifier (`_id`).
///
/// Equality, ordering and hashing follow how the server matches `_id`
/// values: numbers compare by value (`1`, `NumberLong(1)` and `1.0` are the
/// same id), everything else by its canonical extended-JSON form, so a
/// string `"1"` never equals the number `1`.
#[derive(Debug, Clone)]
pub struct DocumentId {
    value: Bson,
    key: String,
}

impl DocumentId {
    /// Wrap a raw `_id` value.
    pub fn new(value: Bson) -> Self {
        let key = match integral(&value) {
            Some(n) => format!("n:{}", n),
            None => format!("x:{}", value.clone().into_canonical_extjson()),
        };
        Self { value, key }
    }

    /// Build an id from anything convertible to BSON.
    pub fn of(value: impl Into<Bson>) -> Self {
        Self::new(value.into())
    }

    /// Extract the `_id` of a document.
    pub fn from_document(collection: &str, document: &Document) -> Result<Self> {
        document
            .get(ID_FIELD)
            .cloned()
            .map(Self::new)
            .ok_or_else(|| ReplicationError::InvalidDocument {
                collection: collection.to_string(),
                message: "document has no _id field".to_string(),
            })
    }

    /// The raw BSON value.
    pub fn value(&self) -> &Bson {
        &self.value
    }

    /// A `{ _id: <value> }` filter selecting exactly this document.
    pub fn filter(&self) -> Document {
        doc! { ID_FIELD: self.value.clone() }
    }
}

/// The integer a numeric id stands for, if it has an exact one.
fn integral(value: &Bson) -> Option<i64> {
    match *value {
        Bson::Int32(n) => Some(i64::from(n)),
        Bson::Int64(n) => Some(n),
        // i64::MAX as f64 rounds up to 2^63, hence the strict bound
        Bson::Double(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Some(f as i64)
        }
        _ => None,
    }
}

impl From<Bson> for DocumentId {
    fn from(value: Bson) -> Self {
        Self::new(value)
    }
}

impl PartialEq for DocumentId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DocumentId {}

impl Hash for DocumentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for DocumentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocumentId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Result of a replace-or-insert write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No document with this id existed; one was inserted.
    Inserted,
    /// A document existed with different content and was replaced.
    Replaced,
    /// A document existed with identical content; nothing changed.
    Unchanged,
}

/// Read operations shared by source and replicas.
pub trait CollectionReader: Send + Sync + 'static {
    /// Human-readable identity used in logs and reports (`database@address`).
    fn identity(&self) -> &str;

    /// List every collection name, reserved ones included.
    fn list_collections(&self) -> BoxFuture<'_, Vec<String>>;

    /// Count all documents in a collection (zero if it does not exist).
    fn count_documents(&self, collection: &str) -> BoxFuture<'_, u64>;

    /// Stream the ids of every document in a collection.
    fn find_ids(&self, collection: &str) -> BoxFuture<'_, IdStream>;
}

/// Read-only access to the authoritative database.
pub trait SourceStore: CollectionReader {
    /// Stream every document of a collection, content untouched.
    fn find_documents(&self, collection: &str) -> BoxFuture<'_, DocumentStream>;

    /// Check whether a document with this id exists.
    fn contains_id(&self, collection: &str, id: &DocumentId) -> BoxFuture<'_, bool>;
}

/// Read/write access to one replica database.
pub trait ReplicaStore: CollectionReader {
    /// Replace the document with the same `_id`, or insert it if absent.
    ///
    /// This is a full replace: after the call the stored content equals `document`.
    fn upsert(&self, collection: &str, document: Document) -> BoxFuture<'_, UpsertOutcome>;

    /// Delete one document by id. Returns `true` if a document was removed.
    fn delete(&self, collection: &str, id: &DocumentId) -> BoxFuture<'_, bool>;

    /// Drop a whole collection.
    fn drop_collection(&self, collection: &str) -> BoxFuture<'_, ()>;
}
