//! Remote Record Store
//!
//! The engine never speaks a wire protocol of its own; it drives whatever
//! record store the host app provides through [`RecordStore`].
//!
//! ## Structure
//! - `records.rs` - record kinds, raw records, queries, typed records
//! - `memory.rs` - in-memory store with call counters and fault injection
//! - `http.rs` - REST adapter over `reqwest`

pub mod http;
pub mod memory;
pub mod records;

pub use http::HttpRecordStore;
pub use memory::{MemoryRecordStore, Operation};
pub use records::{
    ClientRecord, CommandAction, CommandRecord, CommandStatus, Query, RawRecord, Record,
    RecordKind, ScenarioRecord, SettingsBackup,
};

use std::sync::Arc;

use async_trait::async_trait;

use crate::logic::error::RecordError;

/// Typed CRUD + predicate query over the remote collections
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Check the collection for `kind` exists and is writable
    async fn ensure_schema(&self, kind: RecordKind) -> Result<(), RecordError>;

    async fn query(&self, kind: RecordKind, query: &Query) -> Result<Vec<RawRecord>, RecordError>;

    async fn fetch(&self, kind: RecordKind, id: &str) -> Result<Option<RawRecord>, RecordError>;

    /// Fails with [`RecordError::AlreadyExists`] when the id is taken
    async fn create(&self, record: RawRecord) -> Result<RawRecord, RecordError>;

    /// Insert or overwrite
    async fn save(&self, record: RawRecord) -> Result<RawRecord, RecordError>;

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), RecordError>;

    /// Write many records in one round-trip
    async fn create_batch(&self, records: Vec<RawRecord>) -> Result<(), RecordError>;
}

/// Typed facade over a shared [`RecordStore`] handle
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn RecordStore>,
}

impl Records {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Run a query and decode every hit, skipping records that fail to decode
    pub async fn query<T: Record>(&self, query: &Query) -> Result<Vec<T>, RecordError> {
        let raw = self.store.query(T::KIND, query).await?;
        let mut decoded = Vec::with_capacity(raw.len());

        for record in &raw {
            match T::from_raw(record) {
                Ok(typed) => decoded.push(typed),
                Err(e) => log::warn!("Skipping malformed {} record: {}", T::KIND, e),
            }
        }

        Ok(decoded)
    }

    pub async fn fetch<T: Record>(&self, id: &str) -> Result<Option<T>, RecordError> {
        match self.store.fetch(T::KIND, id).await? {
            Some(raw) => Ok(Some(T::from_raw(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn create<T: Record>(&self, record: &T) -> Result<T, RecordError> {
        let saved = self.store.create(record.to_raw()).await?;
        Ok(T::from_raw(&saved)?)
    }

    pub async fn save<T: Record>(&self, record: &T) -> Result<T, RecordError> {
        let saved = self.store.save(record.to_raw()).await?;
        Ok(T::from_raw(&saved)?)
    }

    /// Delete every record of `kind` matching `query`
    ///
    /// Every match is attempted; the first failure is returned afterwards.
    /// Records that vanished in the meantime are not an error.
    pub async fn delete_matching(&self, kind: RecordKind, query: &Query) -> Result<usize, RecordError> {
        let matches = self.store.query(kind, query).await?;
        let mut deleted = 0;
        let mut first_error = None;

        for record in matches {
            match self.store.delete(kind, &record.id).await {
                Ok(()) => deleted += 1,
                Err(RecordError::NotFound(_)) => {}
                Err(e) => {
                    log::warn!("Failed to delete {} {}: {}", kind, record.id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }
}
