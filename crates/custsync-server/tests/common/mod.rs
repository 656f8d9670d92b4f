//! Shared fixtures for the sync integration tests

#![allow(dead_code)]

use custsync_common::types::CustomerFields;
use custsync_server::sync::{
    memory::{InMemoryCustomerDb, InMemoryTabularSource},
    DocumentRef, RateGate, ReconciliationEngine, SyncService, TabularRow,
};
use std::sync::Arc;

pub const DOC: &str = "spreadsheet-test";
pub const RANGE: &str = "Sheet1!A1:K";

pub fn document() -> DocumentRef {
    DocumentRef::new(DOC, RANGE)
}

pub fn engine(source: &InMemoryTabularSource) -> ReconciliationEngine<InMemoryTabularSource> {
    ReconciliationEngine::new(source.clone(), document())
}

pub fn service(
    source: &InMemoryTabularSource,
    db: &InMemoryCustomerDb,
) -> SyncService<InMemoryTabularSource, InMemoryCustomerDb> {
    SyncService::new(Arc::new(RateGate::default()), engine(source), db.clone())
}

pub fn customer(name: &str, email: &str) -> CustomerFields {
    CustomerFields {
        name: name.to_string(),
        email: email.to_string(),
        phone: Some("555-0100".to_string()),
        address: Some("1 Main St".to_string()),
        city: Some("Springfield".to_string()),
        state: Some("IL".to_string()),
        country: Some("USA".to_string()),
        postal_code: Some("62701".to_string()),
    }
}

/// Three customers, one with every optional field empty
pub fn three_customers() -> Vec<CustomerFields> {
    vec![
        customer("John Doe", "john.doe@example.com"),
        customer("Jane Smith", "jane.smith@example.com"),
        CustomerFields {
            name: "Sparse".to_string(),
            email: "sparse@example.com".to_string(),
            ..Default::default()
        },
    ]
}

pub fn row(cells: &[&str]) -> TabularRow {
    cells.iter().map(|c| c.to_string()).collect()
}
