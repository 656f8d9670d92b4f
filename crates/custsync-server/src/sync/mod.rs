//! Customer ⇄ sheet reconciliation
//!
//! # Flow
//!
//! A trigger (manual request or a customer mutation) asks the
//! [`RateGate`] for a [`SyncPermit`]. With a permit in hand the
//! [`ReconciliationEngine`] runs one or both directions:
//!
//! - **pull**: read the whole sheet, map each data row with
//!   [`mapper::from_row`], upsert by email into a [`RelationalStore`]
//!   session, commit once.
//! - **push**: list every customer, render header + rows with
//!   [`mapper::to_row`], clear the sheet range, write the full document.
//!
//! The permit records the outcome in the [`SyncStatusTracker`], which serves
//! the `{in_progress, last_sync, error, can_sync}` projection.
//!
//! # Merge policy
//!
//! Last writer wins, keyed on email. The incoming sheet row always overwrites
//! the mapped fields of an existing customer; rows later in the sheet
//! overwrite earlier rows with the same email. Customers missing from the
//! sheet are left alone: absence is not deletion.
//!
//! # Unsafe window
//!
//! Push clears the range before writing it. If the write fails (or the
//! process dies) between the two calls, the sheet is left empty until the
//! next successful push. This is logged at `warn` and is recovered by
//! retrying the push.

use std::time::Duration;
use thiserror::Error;

pub mod engine;
pub mod mapper;
pub mod memory;
pub mod ports;
pub mod rate_gate;
pub mod service;
pub mod status;

pub use engine::{PullReport, ReconciliationEngine};
pub use ports::{
    AdapterError, DocumentRef, RelationalStore, StoreError, StoreProvider, TabularRow,
    TabularSourceAdapter,
};
pub use rate_gate::{RateGate, SyncPermit};
pub use service::{SyncReport, SyncService};
pub use status::{SyncOperation, SyncStatus, SyncStatusTracker};

/// Operation class of customer syncs
pub const CUSTOMERS_OP_CLASS: &str = "customers";

/// Operation class of sheet-initiated syncs
pub const SHEETS_OP_CLASS: &str = "sheets";

/// Why the gate refused to start a sync. Control signals, not failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateRejection {
    #[error("{op_class} sync already in progress")]
    Busy { op_class: String },

    #[error("Rate limit exceeded for {op_class} sync. Please try again later.")]
    RateLimited {
        op_class: String,
        retry_after: Duration,
    },
}

/// Errors surfaced by a sync run
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Rejected(#[from] GateRejection),

    #[error("Tabular source failure: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Relational store failure: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// True for Busy / RateLimited, which callers should retry later
    pub fn is_retry_later(&self) -> bool {
        matches!(self, SyncError::Rejected(_))
    }
}
