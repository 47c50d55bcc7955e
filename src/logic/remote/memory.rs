//! In-memory record store backed by per-kind `BTreeMap`s.
//!
//! A fully functional [`RecordStore`] for tests, the demo binary and offline
//! development. It counts calls per operation, remembers the size of every
//! batch write, and can be told to fail operations or to hide a freshly
//! written record from direct fetches for a while (replication lag).

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::records::{Query, RawRecord, RecordKind};
use super::RecordStore;
use crate::logic::error::RecordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    EnsureSchema,
    Query,
    Fetch,
    Create,
    Save,
    Delete,
    CreateBatch,
}

#[derive(Debug)]
struct Fault {
    op: Operation,
    kind: Option<RecordKind>,
    remaining: u32,
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<RecordKind, BTreeMap<String, RawRecord>>>,
    calls: Mutex<HashMap<Operation, usize>>,
    batches: Mutex<Vec<usize>>,
    faults: Mutex<Vec<Fault>>,
    hidden: Mutex<HashMap<String, u32>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Operator-side / inspection helpers
    // ------------------------------------------------------------------

    /// Write a record directly, bypassing counters and faults
    pub fn insert(&self, record: RawRecord) {
        self.records
            .write()
            .entry(record.kind)
            .or_default()
            .insert(record.id.clone(), record);
    }

    pub fn get(&self, kind: RecordKind, id: &str) -> Option<RawRecord> {
        self.records.read().get(&kind).and_then(|m| m.get(id)).cloned()
    }

    pub fn records(&self, kind: RecordKind) -> Vec<RawRecord> {
        self.records
            .read()
            .get(&kind)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: RecordKind) -> usize {
        self.records.read().get(&kind).map_or(0, |m| m.len())
    }

    pub fn call_count(&self, op: Operation) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Size of every `create_batch` call that reached the store, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }

    /// Fail the next `times` calls of `op` (optionally only for `kind`)
    pub fn fail_next(&self, op: Operation, kind: Option<RecordKind>, times: u32) {
        self.faults.lock().push(Fault {
            op,
            kind,
            remaining: times,
        });
    }

    /// Fail every call of `op` until [`clear_faults`](Self::clear_faults)
    pub fn fail_always(&self, op: Operation, kind: Option<RecordKind>) {
        self.fail_next(op, kind, u32::MAX);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Make the next `times` direct fetches of `id` miss
    pub fn hide_from_fetch(&self, id: &str, times: u32) {
        self.hidden.lock().insert(id.to_string(), times);
    }

    // ------------------------------------------------------------------

    fn enter(&self, op: Operation, kind: Option<RecordKind>) -> Result<(), RecordError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;

        let mut faults = self.faults.lock();
        let hit = faults
            .iter()
            .position(|f| f.op == op && f.remaining > 0 && (f.kind.is_none() || f.kind == kind));

        match hit {
            Some(index) => {
                if faults[index].remaining != u32::MAX {
                    faults[index].remaining -= 1;
                }
                faults.retain(|f| f.remaining > 0);
                Err(RecordError::Network(format!("injected {:?} failure", op)))
            }
            None => Ok(()),
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn ensure_schema(&self, kind: RecordKind) -> Result<(), RecordError> {
        self.enter(Operation::EnsureSchema, Some(kind))
    }

    async fn query(&self, kind: RecordKind, query: &Query) -> Result<Vec<RawRecord>, RecordError> {
        self.enter(Operation::Query, Some(kind))?;

        let mut hits: Vec<RawRecord> = self
            .records
            .read()
            .get(&kind)
            .map(|m| m.values().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(field) = &query.sort_ascending {
            hits.sort_by(|a, b| compare_values(a.get(field), b.get(field)));
        }

        Ok(hits)
    }

    async fn fetch(&self, kind: RecordKind, id: &str) -> Result<Option<RawRecord>, RecordError> {
        self.enter(Operation::Fetch, Some(kind))?;

        {
            let mut hidden = self.hidden.lock();
            if let Some(left) = hidden.get_mut(id) {
                *left = left.saturating_sub(1);
                if *left == 0 {
                    hidden.remove(id);
                }
                return Ok(None);
            }
        }

        Ok(self.get(kind, id))
    }

    async fn create(&self, record: RawRecord) -> Result<RawRecord, RecordError> {
        self.enter(Operation::Create, Some(record.kind))?;

        let mut records = self.records.write();
        let collection = records.entry(record.kind).or_default();
        if collection.contains_key(&record.id) {
            return Err(RecordError::AlreadyExists(record.id));
        }
        collection.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn save(&self, record: RawRecord) -> Result<RawRecord, RecordError> {
        self.enter(Operation::Save, Some(record.kind))?;
        self.insert(record.clone());
        Ok(record)
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), RecordError> {
        self.enter(Operation::Delete, Some(kind))?;

        match self.records.write().get_mut(&kind).and_then(|m| m.remove(id)) {
            Some(_) => Ok(()),
            None => Err(RecordError::NotFound(id.to_string())),
        }
    }

    async fn create_batch(&self, records: Vec<RawRecord>) -> Result<(), RecordError> {
        let kind = records.first().map(|r| r.kind);
        self.enter(Operation::CreateBatch, kind)?;

        self.batches.lock().push(records.len());
        for record in records {
            self.insert(record);
        }
        Ok(())
    }
}
