//! Custsync Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Keeps the `customers` table and a shared Google Sheet in step.
//!
//! # Overview
//!
//! - **Sync core** ([`sync`]): the rate gate, status tracker, row mapper and
//!   the reconciliation engine that pushes customers to the sheet and pulls
//!   sheet rows back into the table
//! - **Database** ([`db`]): PostgreSQL pool, migrations and the
//!   transactional customer store
//! - **Sheets** ([`sheets`]): the Google Sheets v4 client and credential
//!   resolution
//! - **API** ([`api`]): endpoints to trigger a sync and read its status
//! - **Configuration** ([`config`]): environment-based settings
//!
//! # Example
//!
//! ```no_run
//! use custsync_server::sync::{
//!     memory::{InMemoryCustomerDb, InMemoryTabularSource},
//!     DocumentRef, RateGate, ReconciliationEngine, SyncService, CUSTOMERS_OP_CLASS,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), custsync_server::sync::SyncError> {
//! let engine = ReconciliationEngine::new(
//!     InMemoryTabularSource::new(),
//!     DocumentRef::new("spreadsheet-id", "Sheet1!A1:K"),
//! );
//! let service = SyncService::new(Arc::new(RateGate::default()), engine, InMemoryCustomerDb::new());
//! let report = service.sync_bidirectional(CUSTOMERS_OP_CLASS).await?;
//! println!("pushed {:?} rows", report.pushed);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod sheets;
pub mod sync;

pub use error::{AppError, AppResult};
