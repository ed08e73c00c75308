//! Capability interface to the remote document store.
//!
//! The catalog only ever talks to the store through [`DocumentStore`]; query
//! evaluation, change notification and transaction isolation all live on the
//! other side of this trait.

pub mod memory;
pub mod transaction;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::subscription::Disposer;

pub use memory::MemoryStore;
pub use transaction::{DEFAULT_MAX_ATTEMPTS, TransactionBody, run_transaction};

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

/// Equality filter on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// Selects the documents of one collection, optionally filtered.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<FieldFilter>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filter: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match &self.filter {
            Some(f) => doc.data.get(&f.field) == Some(&f.value),
            None => true,
        }
    }
}

/// Full result set of a live query at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    pub docs: Vec<Document>,
}

pub type SnapshotCallback = Box<dyn Fn(QuerySnapshot) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(StoreError) + Send + Sync>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a live query. The current result set is delivered right away and
    /// again after every change; once `on_error` fires the stream is closed.
    fn subscribe(
        &self,
        query: Query,
        on_change: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Result<Disposer, StoreError>;

    async fn get_document(&self, collection: &str, id: &str)
    -> Result<Option<Document>, StoreError>;

    /// Stores a new document under a store-assigned id and returns that id.
    async fn create_document(
        &self,
        collection: &str,
        data: Map<String, Value>,
    ) -> Result<String, StoreError>;

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Merges `data` into an existing document.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<(), StoreError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

/// One attempt at an atomic read-then-write unit of work.
///
/// All reads must happen before the first write. Dropping a transaction
/// without committing discards its writes.
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    fn set(&mut self, collection: &str, id: &str, data: Map<String, Value>);

    fn update(&mut self, collection: &str, id: &str, data: Map<String, Value>);

    /// Applies every buffered write or none of them. Fails with
    /// [`StoreError::Conflict`] when something this transaction read has
    /// changed in the meantime.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
