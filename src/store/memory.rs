//! In-process [`DocumentStore`] with versioned documents.
//!
//! Every document carries a version that changes on each write; a transaction
//! remembers the versions it read and refuses to commit when any of them has
//! moved. Each async call yields to the scheduler once, so concurrent callers
//! interleave the way they would against a remote store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{
    Document, DocumentStore, ErrorCallback, Query, QuerySnapshot, SnapshotCallback, Transaction,
};
use crate::subscription::Disposer;

struct Entry {
    data: Map<String, Value>,
    version: u64,
}

struct Listener {
    query: Query,
    on_change: SnapshotCallback,
    on_error: ErrorCallback,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Entry>>,
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
    next_version: u64,
    pending_failure: Option<String>,
}

impl Inner {
    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn version_of(&self, collection: &str, id: &str) -> Option<u64> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|e| e.version)
    }

    fn take_failure(&mut self) -> Result<(), StoreError> {
        match self.pending_failure.take() {
            Some(msg) => Err(StoreError::Unavailable(msg)),
            None => Ok(()),
        }
    }

    fn snapshot(&self, query: &Query) -> QuerySnapshot {
        let docs = self
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, e)| Document {
                        id: id.clone(),
                        data: e.data.clone(),
                    })
                    .filter(|doc| query.matches(doc))
                    .collect()
            })
            .unwrap_or_default();
        QuerySnapshot { docs }
    }

    fn put(&mut self, collection: &str, id: &str, data: Map<String, Value>) {
        let version = self.bump_version();
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), Entry { data, version });
    }

    fn merge(
        &mut self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let version = self.bump_version();
        let entry = self
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        entry.data.extend(data);
        entry.version = version;
        Ok(())
    }

    fn notify(&self, collection: &str) {
        for listener in self.listeners.values() {
            if listener.query.collection == collection {
                (listener.on_change)(self.snapshot(&listener.query));
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    operations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next subscribe, write, delete or commit fail with
    /// [`StoreError::Unavailable`].
    pub fn fail_next_operation(&self, message: impl Into<String>) {
        self.inner.lock().pending_failure = Some(message.into());
    }

    /// Reports a stream failure to every listener on `collection` and closes
    /// those streams.
    pub fn fail_listeners(&self, collection: &str, message: &str) {
        let mut inner = self.inner.lock();
        let ids: Vec<u64> = inner
            .listeners
            .iter()
            .filter(|(_, l)| l.query.collection == collection)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(listener) = inner.listeners.remove(&id) {
                (listener.on_error)(StoreError::Unavailable(message.to_string()));
            }
        }
    }

    pub fn listener_count(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .listeners
            .values()
            .filter(|l| l.query.collection == collection)
            .count()
    }

    /// Number of calls made through the [`DocumentStore`] interface.
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn subscribe(
        &self,
        query: Query,
        on_change: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Result<Disposer, StoreError> {
        self.record_operation();
        let mut inner = self.inner.lock();
        inner.take_failure()?;
        inner.next_listener += 1;
        let id = inner.next_listener;

        on_change(inner.snapshot(&query));
        debug!("listener {} attached to {}", id, query.collection);
        inner.listeners.insert(
            id,
            Listener {
                query,
                on_change,
                on_error,
            },
        );

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Disposer::new(move || {
            if let Some(inner) = weak.upgrade() {
                if inner.lock().listeners.remove(&id).is_some() {
                    debug!("listener {} detached", id);
                }
            }
        }))
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.record_operation();
        tokio::task::yield_now().await;
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|e| Document {
                id: id.to_string(),
                data: e.data.clone(),
            }))
    }

    async fn create_document(
        &self,
        collection: &str,
        data: Map<String, Value>,
    ) -> Result<String, StoreError> {
        self.record_operation();
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock();
        inner.take_failure()?;
        let id = Uuid::new_v4().simple().to_string();
        inner.put(collection, &id, data);
        inner.notify(collection);
        Ok(id)
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.record_operation();
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock();
        inner.take_failure()?;
        inner.put(collection, id, data);
        inner.notify(collection);
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.record_operation();
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock();
        inner.take_failure()?;
        inner.merge(collection, id, data)?;
        inner.notify(collection);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.record_operation();
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock();
        inner.take_failure()?;
        let removed = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            inner.notify(collection);
        }
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StoreError> {
        self.record_operation();
        tokio::task::yield_now().await;
        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            reads: Vec::new(),
            writes: Vec::new(),
        }))
    }
}

enum Write {
    Set {
        collection: String,
        id: String,
        data: Map<String, Value>,
    },
    Update {
        collection: String,
        id: String,
        data: Map<String, Value>,
    },
}

impl Write {
    fn collection(&self) -> &str {
        match self {
            Write::Set { collection, .. } | Write::Update { collection, .. } => collection,
        }
    }
}

struct Read {
    collection: String,
    id: String,
    version: Option<u64>,
}

struct MemoryTransaction {
    inner: Arc<Mutex<Inner>>,
    reads: Vec<Read>,
    writes: Vec<Write>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        if !self.writes.is_empty() {
            return Err(StoreError::InvalidTransaction(
                "all reads must happen before the first write".to_string(),
            ));
        }
        tokio::task::yield_now().await;

        let inner = self.inner.lock();
        let entry = inner.collections.get(collection).and_then(|docs| docs.get(id));
        self.reads.push(Read {
            collection: collection.to_string(),
            id: id.to_string(),
            version: entry.map(|e| e.version),
        });
        Ok(entry.map(|e| Document {
            id: id.to_string(),
            data: e.data.clone(),
        }))
    }

    fn set(&mut self, collection: &str, id: &str, data: Map<String, Value>) {
        self.writes.push(Write::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
    }

    fn update(&mut self, collection: &str, id: &str, data: Map<String, Value>) {
        self.writes.push(Write::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        tokio::task::yield_now().await;

        let MemoryTransaction {
            inner,
            reads,
            writes,
        } = *self;
        let mut inner = inner.lock();
        inner.take_failure()?;

        for read in &reads {
            if inner.version_of(&read.collection, &read.id) != read.version {
                return Err(StoreError::Conflict(format!(
                    "{}/{}",
                    read.collection, read.id
                )));
            }
        }

        // Replay the writes in order against what would exist, so an update of
        // a missing document fails before anything is applied.
        {
            let mut created: HashSet<(&str, &str)> = HashSet::new();
            for write in &writes {
                match write {
                    Write::Set { collection, id, .. } => {
                        created.insert((collection.as_str(), id.as_str()));
                    }
                    Write::Update { collection, id, .. } => {
                        let exists = inner.version_of(collection, id).is_some()
                            || created.contains(&(collection.as_str(), id.as_str()));
                        if !exists {
                            return Err(StoreError::NotFound {
                                collection: collection.clone(),
                                id: id.clone(),
                            });
                        }
                    }
                }
            }
        }

        let mut touched: Vec<String> = Vec::new();
        for write in writes {
            let collection = write.collection().to_string();
            match write {
                Write::Set { collection, id, data } => inner.put(&collection, &id, data),
                Write::Update { collection, id, data } => inner.merge(&collection, &id, data)?,
            }
            if !touched.contains(&collection) {
                touched.push(collection);
            }
        }
        for collection in &touched {
            inner.notify(collection);
        }
        Ok(())
    }
}
