//! Recording store with fault injection.
//!
//! Wraps a [`MemoryStore`] and records every trait call. Faults can be armed
//! per operation and (optionally) per collection to make a call fail with an
//! isolated store error, a non-isolated internal error, or a panic.

use doc_replicator::store::{
    BoxFuture, CollectionReader, DocumentId, DocumentStream, IdStream, MemoryStore, ReplicaStore,
    SourceStore, UpsertOutcome,
};
use doc_replicator::ReplicationError;
use mongodb::bson::Document;
use std::sync::Mutex;

/// Store operation, as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Count,
    FindDocuments,
    FindIds,
    ContainsId,
    Upsert,
    Delete,
    Drop,
}

/// What an armed fault does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Isolated store error
    Store,
    /// Non-isolated error that ends the run
    Internal,
    /// Panic inside the worker
    Panic,
}

#[derive(Debug)]
struct Fault {
    op: Op,
    collection: Option<String>,
    kind: FaultKind,
    /// Matching calls to let through before failing
    skip: usize,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub collection: Option<String>,
}

/// A [`MemoryStore`] that records calls and fails on demand.
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<Vec<Call>>,
}

impl FaultyStore {
    pub fn new(identity: &str) -> Self {
        Self {
            inner: MemoryStore::new(identity),
            faults: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped store, for seeding and inspection.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fail every matching call with an isolated store error.
    ///
    /// `collection = None` matches every collection.
    pub fn fail(&self, op: Op, collection: Option<&str>) {
        self.arm(op, collection, FaultKind::Store, 0);
    }

    /// Fail matching calls with `kind`, after letting `skip` of them through.
    pub fn arm(&self, op: Op, collection: Option<&str>, kind: FaultKind, skip: usize) {
        self.faults.lock().unwrap().push(Fault {
            op,
            collection: collection.map(str::to_string),
            kind,
            skip,
        });
    }

    /// Disarm every fault.
    pub fn heal(&self) {
        self.faults.lock().unwrap().clear();
    }

    /// Every call recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls of one kind.
    pub fn count(&self, op: Op) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.op == op).count()
    }

    /// Number of calls of one kind touching one collection.
    pub fn count_in(&self, op: Op, collection: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == op && c.collection.as_deref() == Some(collection))
            .count()
    }

    /// Whether any call touched a collection.
    pub fn touched(&self, collection: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.collection.as_deref() == Some(collection))
    }

    fn check(&self, op: Op, collection: Option<&str>) -> doc_replicator::Result<()> {
        self.calls.lock().unwrap().push(Call {
            op,
            collection: collection.map(str::to_string),
        });

        // Decide under the lock, act after releasing it so a panic does not
        // poison the mutex for other workers.
        let triggered = {
            let mut faults = self.faults.lock().unwrap();
            let mut triggered = None;
            for fault in faults.iter_mut() {
                let matches = fault.op == op
                    && (fault.collection.is_none() || fault.collection.as_deref() == collection);
                if !matches {
                    continue;
                }
                if fault.skip > 0 {
                    fault.skip -= 1;
                    continue;
                }
                triggered = Some(fault.kind);
                break;
            }
            triggered
        };

        match triggered {
            None => Ok(()),
            Some(FaultKind::Store) => Err(ReplicationError::store_msg(
                format!("{:?}", op),
                self.inner.identity(),
                "injected fault",
            )),
            Some(FaultKind::Internal) => {
                Err(ReplicationError::Internal(format!("injected fault in {:?}", op)))
            }
            Some(FaultKind::Panic) => panic!("injected panic in {:?}", op),
        }
    }
}

impl CollectionReader for FaultyStore {
    fn identity(&self) -> &str {
        self.inner.identity()
    }

    fn list_collections(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(async move {
            self.check(Op::List, None)?;
            self.inner.list_collections().await
        })
    }

    fn count_documents(&self, collection: &str) -> BoxFuture<'_, u64> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.check(Op::Count, Some(&collection))?;
            self.inner.count_documents(&collection).await
        })
    }

    fn find_ids(&self, collection: &str) -> BoxFuture<'_, IdStream> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.check(Op::FindIds, Some(&collection))?;
            self.inner.find_ids(&collection).await
        })
    }
}

impl SourceStore for FaultyStore {
    fn find_documents(&self, collection: &str) -> BoxFuture<'_, DocumentStream> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.check(Op::FindDocuments, Some(&collection))?;
            self.inner.find_documents(&collection).await
        })
    }

    fn contains_id(&self, collection: &str, id: &DocumentId) -> BoxFuture<'_, bool> {
        let collection = collection.to_string();
        let id = id.clone();
        Box::pin(async move {
            self.check(Op::ContainsId, Some(&collection))?;
            self.inner.contains_id(&collection, &id).await
        })
    }
}

impl ReplicaStore for FaultyStore {
    fn upsert(&self, collection: &str, document: Document) -> BoxFuture<'_, UpsertOutcome> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.check(Op::Upsert, Some(&collection))?;
            self.inner.upsert(&collection, document).await
        })
    }

    fn delete(&self, collection: &str, id: &DocumentId) -> BoxFuture<'_, bool> {
        let collection = collection.to_string();
        let id = id.clone();
        Box::pin(async move {
            self.check(Op::Delete, Some(&collection))?;
            self.inner.delete(&collection, &id).await
        })
    }

    fn drop_collection(&self, collection: &str) -> BoxFuture<'_, ()> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.check(Op::Drop, Some(&collection))?;
            self.inner.drop_collection(&collection).await
        })
    }
}
