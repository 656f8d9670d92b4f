//! Customer ⇄ sheet row mapping
//!
//! The sheet layout is positional. Column order is the contract in both
//! directions:
//!
//! | col | 0  | 1    | 2     | 3     | 4       | 5    | 6     | 7       | 8           | 9          | 10         |
//! |-----|----|------|-------|-------|---------|------|-------|---------|-------------|------------|------------|
//! |     | ID | Name | Email | Phone | Address | City | State | Country | Postal Code | Created At | Updated At |
//!
//! Columns 0, 9 and 10 belong to the relational store. They are written on
//! push for display and ignored on pull.
//!
//! The header row is not checked before data rows are parsed. Reordering the
//! sheet's columns silently mis-maps every row.

use chrono::{DateTime, SecondsFormat, Utc};
use custsync_common::types::{CustomerFields, CustomerRecord};

use super::ports::TabularRow;

/// Header row of the customers sheet
pub const HEADER: [&str; COLUMN_COUNT] = [
    "ID",
    "Name",
    "Email",
    "Phone",
    "Address",
    "City",
    "State",
    "Country",
    "Postal Code",
    "Created At",
    "Updated At",
];

pub const COLUMN_COUNT: usize = 11;

/// Rows shorter than this (ID through Postal Code) are skipped on pull
pub const MIN_DATA_CELLS: usize = 9;

pub fn header_row() -> TabularRow {
    HEADER.iter().map(|h| h.to_string()).collect()
}

/// Render a customer as an 11-cell row. Missing optional fields become
/// empty cells.
pub fn to_row(record: &CustomerRecord) -> TabularRow {
    vec![
        record.id.to_string(),
        record.name.clone(),
        record.email.clone(),
        cell(&record.phone),
        cell(&record.address),
        cell(&record.city),
        cell(&record.state),
        cell(&record.country),
        cell(&record.postal_code),
        timestamp(&record.created_at),
        timestamp(&record.updated_at),
    ]
}

/// Map a data row to customer fields.
///
/// Returns `None` when the row has fewer than [`MIN_DATA_CELLS`] cells; the
/// caller skips it. Only columns 1..=8 are read.
pub fn from_row(row: &[String]) -> Option<CustomerFields> {
    if row.len() < MIN_DATA_CELLS {
        return None;
    }

    Some(CustomerFields {
        name: row[1].clone(),
        email: row[2].clone(),
        phone: optional(&row[3]),
        address: optional(&row[4]),
        city: optional(&row[5]),
        state: optional(&row[6]),
        country: optional(&row[7]),
        postal_code: optional(&row[8]),
    })
}

/// Header plus one row per record, in the given order
pub fn build_document(records: &[CustomerRecord]) -> Vec<TabularRow> {
    std::iter::once(header_row())
        .chain(records.iter().map(to_row))
        .collect()
}

fn cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}
