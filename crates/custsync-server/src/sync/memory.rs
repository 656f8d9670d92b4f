//! In-process implementations of the sync ports
//!
//! Used by the test suites and for local dry runs without Postgres or Google
//! credentials. Both types are cheap handles over shared state, so a clone
//! handed to the engine and a clone kept by the test see the same data.

use async_trait::async_trait;
use chrono::Utc;
use custsync_common::types::{CustomerFields, CustomerRecord};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::ports::{
    AdapterError, RelationalStore, StoreError, StoreProvider, TabularRow, TabularSourceAdapter,
};

// ============================================================================
// Tabular source
// ============================================================================

#[derive(Debug, Default)]
struct SheetState {
    documents: HashMap<(String, String), Vec<TabularRow>>,
    calls: Vec<&'static str>,
    fail_reads: bool,
    fail_clears: bool,
    fail_writes: bool,
    read_delay: Option<Duration>,
}

/// A sheet held in memory, keyed by document id and range
#[derive(Debug, Clone, Default)]
pub struct InMemoryTabularSource {
    state: Arc<Mutex<SheetState>>,
}

impl InMemoryTabularSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rows(&self, document_id: &str, range: &str, rows: Vec<TabularRow>) {
        self.state
            .lock()
            .documents
            .insert(key(document_id, range), rows);
    }

    pub fn rows(&self, document_id: &str, range: &str) -> Vec<TabularRow> {
        self.state
            .lock()
            .documents
            .get(&key(document_id, range))
            .cloned()
            .unwrap_or_default()
    }

    /// Names of the adapter calls made so far, oldest first
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn fail_clears(&self, fail: bool) {
        self.state.lock().fail_clears = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Delay every read, to hold a sync in progress
    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().read_delay = Some(delay);
    }
}

fn key(document_id: &str, range: &str) -> (String, String) {
    (document_id.to_string(), range.to_string())
}

fn simulated(call: &str) -> AdapterError {
    AdapterError::Transport(format!("simulated {call} failure"))
}

#[async_trait]
impl TabularSourceAdapter for InMemoryTabularSource {
    async fn read(&self, document_id: &str, range: &str) -> Result<Vec<TabularRow>, AdapterError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push("read");
            if state.fail_reads {
                return Err(simulated("read"));
            }
            state.read_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(self.rows(document_id, range))
    }

    async fn clear(&self, document_id: &str, range: &str) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.calls.push("clear");
        if state.fail_clears {
            return Err(simulated("clear"));
        }
        state.documents.remove(&key(document_id, range));
        Ok(())
    }

    async fn write(
        &self,
        document_id: &str,
        range: &str,
        rows: Vec<TabularRow>,
    ) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.calls.push("write");
        if state.fail_writes {
            return Err(simulated("write"));
        }
        state.documents.insert(key(document_id, range), rows);
        Ok(())
    }
}

// ============================================================================
// Relational store
// ============================================================================

#[derive(Debug, Default)]
struct TableState {
    committed: Vec<CustomerRecord>,
    next_id: i64,
    fail_insert: HashSet<String>,
}

impl TableState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A customers table held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustomerDb {
    table: Arc<Mutex<TableState>>,
}

impl InMemoryCustomerDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert and commit a customer outside any session
    pub fn seed(&self, fields: CustomerFields) -> CustomerRecord {
        let mut table = self.table.lock();
        let now = Utc::now();
        let record = new_record(table.allocate_id(), fields, now);
        table.committed.push(record.clone());
        record
    }

    /// Committed customers ordered by id
    pub fn snapshot(&self) -> Vec<CustomerRecord> {
        let mut rows = self.table.lock().committed.clone();
        rows.sort_by_key(|r| r.id);
        rows
    }

    pub fn get(&self, email: &str) -> Option<CustomerRecord> {
        self.table
            .lock()
            .committed
            .iter()
            .find(|r| r.email == email)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.table.lock().committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make any session's insert of `email` fail with a database error
    pub fn fail_insert_of(&self, email: &str) {
        self.table.lock().fail_insert.insert(email.to_string());
    }
}

impl StoreProvider for InMemoryCustomerDb {
    type Store = InMemoryCustomerSession;

    fn open(&self) -> InMemoryCustomerSession {
        InMemoryCustomerSession {
            db: self.clone(),
            pending: Vec::new(),
        }
    }
}

/// A session over [`InMemoryCustomerDb`].
///
/// Writes are buffered as upserts and applied to the shared table in order on
/// commit. Ids come from the shared counter and are not reused after a
/// rollback, like a database sequence.
#[derive(Debug)]
pub struct InMemoryCustomerSession {
    db: InMemoryCustomerDb,
    pending: Vec<CustomerRecord>,
}

impl InMemoryCustomerSession {
    fn view(&self) -> Vec<CustomerRecord> {
        let mut rows = self.db.table.lock().committed.clone();
        for change in &self.pending {
            upsert(&mut rows, change.clone());
        }
        rows
    }
}

fn upsert(rows: &mut Vec<CustomerRecord>, record: CustomerRecord) {
    match rows.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record,
        None => rows.push(record),
    }
}

fn new_record(id: i64, fields: CustomerFields, now: chrono::DateTime<Utc>) -> CustomerRecord {
    CustomerRecord {
        id,
        name: fields.name,
        email: fields.email,
        phone: fields.phone,
        address: fields.address,
        city: fields.city,
        state: fields.state,
        country: fields.country,
        postal_code: fields.postal_code,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl RelationalStore for InMemoryCustomerSession {
    async fn find_by_email(&mut self, email: &str) -> Result<Option<CustomerRecord>, StoreError> {
        Ok(self.view().into_iter().find(|r| r.email == email))
    }

    async fn insert(&mut self, fields: CustomerFields) -> Result<CustomerRecord, StoreError> {
        if self.view().iter().any(|r| r.email == fields.email) {
            return Err(StoreError::Duplicate(fields.email));
        }

        let id = {
            let mut table = self.db.table.lock();
            if table.fail_insert.contains(&fields.email) {
                return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                    "simulated insert failure for {}",
                    fields.email
                ))));
            }
            table.allocate_id()
        };

        let record = new_record(id, fields, Utc::now());
        self.pending.push(record.clone());
        Ok(record)
    }

    async fn update_fields(
        &mut self,
        record: &CustomerRecord,
        fields: CustomerFields,
    ) -> Result<CustomerRecord, StoreError> {
        let mut current = self
            .view()
            .into_iter()
            .find(|r| r.id == record.id)
            .ok_or_else(|| StoreError::NotFound(record.email.clone()))?;

        if current.fields() == fields {
            return Ok(current);
        }

        current.apply(fields);
        current.updated_at = Utc::now();
        self.pending.push(current.clone());
        Ok(current)
    }

    async fn list_all(&mut self) -> Result<Vec<CustomerRecord>, StoreError> {
        let mut rows = self.view();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let pending = std::mem::take(&mut self.pending);
        let mut table = self.db.table.lock();
        for change in pending {
            upsert(&mut table.committed, change);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.pending.clear();
        Ok(())
    }
}
