//! The two sync directions
//!
//! Push and pull are independent and asymmetric. Push is a full replace of
//! the sheet range. Pull is an upsert-by-email of every well-formed data row
//! in one store transaction. Neither direction deletes anything on the other
//! side.

use custsync_common::types::CustomerRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::mapper;
use super::ports::{DocumentRef, RelationalStore, StoreError, TabularRow, TabularSourceAdapter};
use super::SyncError;

/// Counts from one pull batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    /// Data rows seen (header excluded)
    pub rows: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Rows too short to map
    pub skipped: usize,
}

pub struct ReconciliationEngine<A> {
    adapter: A,
    document: DocumentRef,
}

impl<A: TabularSourceAdapter> ReconciliationEngine<A> {
    pub fn new(adapter: A, document: DocumentRef) -> Self {
        Self { adapter, document }
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Replace the sheet range with a header plus one row per record.
    ///
    /// Records are written in the order given. The relational store is not
    /// touched. Returns the number of data rows written.
    #[instrument(skip_all, fields(document = %self.document.document_id, records = records.len()))]
    pub async fn push_to_external(&self, records: &[CustomerRecord]) -> Result<usize, SyncError> {
        let rows = mapper::build_document(records);
        let DocumentRef { document_id, range } = &self.document;

        self.adapter.clear(document_id, range).await.map_err(|e| {
            error!(error = %e, "failed to clear sheet range before push");
            e
        })?;

        if let Err(e) = self.adapter.write(document_id, range, rows).await {
            warn!(
                document_id = %document_id,
                range = %range,
                error = %e,
                "sheet range was cleared but the write failed; it stays empty until the next push"
            );
            return Err(e.into());
        }

        info!(rows = records.len(), "pushed customers to sheet");
        Ok(records.len())
    }

    /// Merge every data row of the sheet into `store` and commit once.
    ///
    /// Any failure rolls back the whole batch. Short rows are skipped and
    /// counted, never treated as failures.
    #[instrument(skip_all, fields(document = %self.document.document_id))]
    pub async fn pull_from_external<S>(&self, store: &mut S) -> Result<PullReport, SyncError>
    where
        S: RelationalStore + ?Sized,
    {
        let DocumentRef { document_id, range } = &self.document;
        let rows = self.adapter.read(document_id, range).await.map_err(|e| {
            error!(error = %e, "failed to read sheet");
            e
        })?;

        if rows.is_empty() {
            info!("no data found in sheet");
        }

        let report = match merge_rows(store, &rows).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "pull batch failed, rolling back");
                if let Err(rollback) = store.rollback().await {
                    warn!(error = %rollback, "rollback after failed pull also failed");
                }
                return Err(e.into());
            }
        };

        store.commit().await?;
        info!(
            rows = report.rows,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            "pulled customers from sheet"
        );
        Ok(report)
    }
}

/// Upsert data rows (everything after the header) in document order
async fn merge_rows<S>(store: &mut S, rows: &[TabularRow]) -> Result<PullReport, StoreError>
where
    S: RelationalStore + ?Sized,
{
    let mut report = PullReport::default();

    for (index, row) in rows.iter().enumerate().skip(1) {
        report.rows += 1;

        let Some(fields) = mapper::from_row(row) else {
            debug!(row = index, cells = row.len(), "skipping short row");
            report.skipped += 1;
            continue;
        };

        match store.find_by_email(&fields.email).await? {
            Some(existing) => {
                store.update_fields(&existing, fields).await?;
                report.updated += 1;
            }
            None => {
                store.insert(fields).await?;
                report.inserted += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::{InMemoryCustomerDb, InMemoryTabularSource};
    use crate::sync::mapper::{header_row, COLUMN_COUNT};
    use crate::sync::ports::StoreProvider;
    use custsync_common::types::CustomerFields;

    const DOC: &str = "doc-1";
    const RANGE: &str = "Sheet1!A1:K";

    fn engine(source: InMemoryTabularSource) -> ReconciliationEngine<InMemoryTabularSource> {
        ReconciliationEngine::new(source, DocumentRef::new(DOC, RANGE))
    }

    fn fields(name: &str, email: &str, city: &str) -> CustomerFields {
        CustomerFields {
            name: name.to_string(),
            email: email.to_string(),
            phone: Some("555-0100".to_string()),
            address: Some("1 Main St".to_string()),
            city: Some(city.to_string()),
            state: Some("NY".to_string()),
            country: Some("USA".to_string()),
            postal_code: Some("10001".to_string()),
        }
    }

    fn data_row(id: &str, f: &CustomerFields) -> TabularRow {
        vec![
            id.to_string(),
            f.name.clone(),
            f.email.clone(),
            f.phone.clone().unwrap_or_default(),
            f.address.clone().unwrap_or_default(),
            f.city.clone().unwrap_or_default(),
            f.state.clone().unwrap_or_default(),
            f.country.clone().unwrap_or_default(),
            f.postal_code.clone().unwrap_or_default(),
        ]
    }

    #[tokio::test]
    async fn test_push_writes_header_and_rows_after_clear() {
        let db = InMemoryCustomerDb::new();
        db.seed(fields("Ann", "ann@example.com", "Albany"));
        db.seed(fields("Bob", "bob@example.com", "Buffalo"));
        db.seed(fields("Cy", "cy@example.com", "Corning"));
        let records = db.snapshot();

        let source = InMemoryTabularSource::new();
        source.set_rows(DOC, RANGE, vec![vec!["stale".to_string()]]);
        let engine = engine(source.clone());

        let written = engine.push_to_external(&records).await.unwrap();
        assert_eq!(written, 3);

        let doc = source.rows(DOC, RANGE);
        assert_eq!(doc.len(), 4);
        assert_eq!(doc[0], header_row());
        assert!(doc.iter().all(|r| r.len() == COLUMN_COUNT));
        assert_eq!(source.calls(), vec!["clear", "write"]);
    }

    #[tokio::test]
    async fn test_push_failure_after_clear_leaves_sheet_empty() {
        let source = InMemoryTabularSource::new();
        source.set_rows(DOC, RANGE, vec![header_row()]);
        source.fail_writes(true);
        let engine = engine(source.clone());

        let err = engine.push_to_external(&[]).await.unwrap_err();
        assert!(matches!(err, SyncError::Adapter(_)));
        assert!(source.rows(DOC, RANGE).is_empty());
    }

    #[tokio::test]
    async fn test_pull_inserts_and_updates_by_email() {
        let db = InMemoryCustomerDb::new();
        let existing = db.seed(fields("Ann Old", "ann@example.com", "Albany"));

        let source = InMemoryTabularSource::new();
        source.set_rows(
            DOC,
            RANGE,
            vec![
                header_row(),
                data_row("", &fields("Ann New", "ann@example.com", "Syracuse")),
                data_row("", &fields("Bob", "bob@example.com", "Buffalo")),
            ],
        );
        let engine = engine(source);

        let mut session = db.open();
        let report = engine.pull_from_external(&mut session).await.unwrap();
        assert_eq!(
            report,
            PullReport {
                rows: 2,
                inserted: 1,
                updated: 1,
                skipped: 0
            }
        );

        let ann = db.get("ann@example.com").unwrap();
        assert_eq!(ann.id, existing.id);
        assert_eq!(ann.created_at, existing.created_at);
        assert_eq!(ann.name, "Ann New");
        assert_eq!(ann.city.as_deref(), Some("Syracuse"));
        assert!(db.get("bob@example.com").is_some());
    }

    #[tokio::test]
    async fn test_pull_skips_short_row_and_keeps_going() {
        let db = InMemoryCustomerDb::new();
        let source = InMemoryTabularSource::new();
        let short: TabularRow = ["1", "Short", "short@example.com", "555", "Main"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        source.set_rows(
            DOC,
            RANGE,
            vec![
                header_row(),
                short,
                data_row("", &fields("Bob", "bob@example.com", "Buffalo")),
            ],
        );

        let mut session = db.open();
        let report = engine(source)
            .pull_from_external(&mut session)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.inserted, 1);
        assert!(db.get("short@example.com").is_none());
        assert!(db.get("bob@example.com").is_some());
    }

    #[tokio::test]
    async fn test_pull_duplicate_email_later_row_wins() {
        let db = InMemoryCustomerDb::new();
        let source = InMemoryTabularSource::new();
        source.set_rows(
            DOC,
            RANGE,
            vec![
                header_row(),
                data_row("", &fields("First", "dup@example.com", "Albany")),
                data_row("", &fields("Second", "dup@example.com", "Buffalo")),
            ],
        );

        let mut session = db.open();
        let report = engine(source)
            .pull_from_external(&mut session)
            .await
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(db.len(), 1);
        let dup = db.get("dup@example.com").unwrap();
        assert_eq!(dup.name, "Second");
        assert_eq!(dup.city.as_deref(), Some("Buffalo"));
    }

    #[tokio::test]
    async fn test_pull_never_deletes_missing_customers() {
        let db = InMemoryCustomerDb::new();
        db.seed(fields("Keep", "keep@example.com", "Albany"));
        let source = InMemoryTabularSource::new();
        source.set_rows(DOC, RANGE, vec![header_row()]);

        let mut session = db.open();
        engine(source)
            .pull_from_external(&mut session)
            .await
            .unwrap();

        assert!(db.get("keep@example.com").is_some());
    }

    #[tokio::test]
    async fn test_pull_failure_mid_batch_rolls_back_everything() {
        let db = InMemoryCustomerDb::new();
        db.fail_insert_of("boom@example.com");
        let source = InMemoryTabularSource::new();
        source.set_rows(
            DOC,
            RANGE,
            vec![
                header_row(),
                data_row("", &fields("Ann", "ann@example.com", "Albany")),
                data_row("", &fields("Boom", "boom@example.com", "Buffalo")),
                data_row("", &fields("Cy", "cy@example.com", "Corning")),
            ],
        );

        let mut session = db.open();
        let err = engine(source)
            .pull_from_external(&mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Store(_)));
        assert!(db.is_empty(), "no row of a failed batch may be applied");
    }

    #[tokio::test]
    async fn test_pull_read_failure_touches_nothing() {
        let db = InMemoryCustomerDb::new();
        db.seed(fields("Ann", "ann@example.com", "Albany"));
        let source = InMemoryTabularSource::new();
        source.fail_reads(true);

        let mut session = db.open();
        let err = engine(source)
            .pull_from_external(&mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Adapter(_)));
        assert_eq!(db.len(), 1);
    }

    #[tokio::test]
    async fn test_pull_empty_document_is_a_noop() {
        let db = InMemoryCustomerDb::new();
        let mut session = db.open();
        let report = engine(InMemoryTabularSource::new())
            .pull_from_external(&mut session)
            .await
            .unwrap();
        assert_eq!(report, PullReport::default());
    }
}
