//! Collaborator interfaces the reconciliation engine calls through
//!
//! The engine never talks to Google Sheets or Postgres directly. It reads and
//! writes a tabular document through [`TabularSourceAdapter`] and merges into
//! customers through a [`RelationalStore`] session.

use async_trait::async_trait;
use custsync_common::types::{CustomerFields, CustomerRecord};
use thiserror::Error;

/// One row of a tabular document, cells left to right
pub type TabularRow = Vec<String>;

/// Address of the rectangular range a sync reads and replaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub document_id: String,
    /// Sheet name plus column span, e.g. `Sheet1!A1:K`
    pub range: String,
}

impl DocumentRef {
    pub fn new(document_id: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            range: range.into(),
        }
    }
}

/// Failures of the external tabular source
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The request never produced a response (connect, timeout, TLS)
    #[error("Sheets request failed: {0}")]
    Transport(String),

    /// The API answered with a non-success status
    #[error("Sheets API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape
    #[error("Unexpected Sheets response: {0}")]
    Decode(String),
}

/// Read, clear and write access to a tabular document
#[async_trait]
pub trait TabularSourceAdapter: Send + Sync {
    /// Every row in `range`, header included. An empty document is an empty vec.
    async fn read(&self, document_id: &str, range: &str) -> Result<Vec<TabularRow>, AdapterError>;

    async fn clear(&self, document_id: &str, range: &str) -> Result<(), AdapterError>;

    async fn write(
        &self,
        document_id: &str,
        range: &str,
        rows: Vec<TabularRow>,
    ) -> Result<(), AdapterError>;
}

/// Failures of the relational store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Customer with email '{0}' not found")]
    NotFound(String),

    #[error("Customer with email '{0}' already exists")]
    Duplicate(String),
}

/// A unit-of-work session over the customers table.
///
/// Writes made through a session are visible to later reads of the same
/// session and become durable only on [`RelationalStore::commit`].
#[async_trait]
pub trait RelationalStore: Send {
    async fn find_by_email(&mut self, email: &str) -> Result<Option<CustomerRecord>, StoreError>;

    /// Insert a new customer. The store assigns id and both timestamps.
    async fn insert(&mut self, fields: CustomerFields) -> Result<CustomerRecord, StoreError>;

    /// Overwrite the mapped fields of `record`. Id and `created_at` are kept;
    /// `updated_at` only moves when some field actually changes.
    async fn update_fields(
        &mut self,
        record: &CustomerRecord,
        fields: CustomerFields,
    ) -> Result<CustomerRecord, StoreError>;

    async fn list_all(&mut self) -> Result<Vec<CustomerRecord>, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Opens a fresh [`RelationalStore`] session per sync run
pub trait StoreProvider: Send + Sync + 'static {
    type Store: RelationalStore + 'static;

    fn open(&self) -> Self::Store;
}
