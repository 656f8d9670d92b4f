//! Google Sheets access

pub mod auth;
pub mod client;

pub use auth::{resolve_credentials, SheetsAccess};
pub use client::SheetsClient;

use custsync_common::{CustsyncError, Result};

use crate::config::SheetsConfig;
use crate::sync::DocumentRef;

/// The document a sync reads and replaces
pub fn document_ref(config: &SheetsConfig) -> Result<DocumentRef> {
    if config.spreadsheet_id.is_empty() {
        return Err(CustsyncError::Config(
            "GOOGLE_SHEET_ID must be set to sync customers".to_string(),
        ));
    }
    Ok(DocumentRef::new(&config.spreadsheet_id, &config.range))
}
