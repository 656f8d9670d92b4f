//! Postgres-backed customer sessions
//!
//! A [`PgCustomerStore`] opens one transaction on first use and keeps it
//! until `commit` or `rollback`. Dropping a session with an open transaction
//! rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custsync_common::types::{CustomerFields, CustomerRecord};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;

use crate::sync::ports::{RelationalStore, StoreError, StoreProvider};

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, address, city, state, country, \
                                postal_code, created_at, updated_at";

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: i64,
    name: String,
    email: String,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    postal_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CustomerRow> for CustomerRecord {
    fn from(row: CustomerRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            address: row.address,
            city: row.city,
            state: row.state,
            country: row.country,
            postal_code: row.postal_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PgCustomerStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgCustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    /// True while a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => {
                debug!("opening customer transaction");
                self.pool.begin().await?
            }
        };
        Ok(self.tx.insert(tx))
    }
}

impl StoreProvider for PgPool {
    type Store = PgCustomerStore;

    fn open(&self) -> PgCustomerStore {
        PgCustomerStore::new(self.clone())
    }
}

#[async_trait]
impl RelationalStore for PgCustomerStore {
    async fn find_by_email(&mut self, email: &str) -> Result<Option<CustomerRecord>, StoreError> {
        let tx = self.tx().await?;
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(CustomerRecord::from))
    }

    async fn insert(&mut self, fields: CustomerFields) -> Result<CustomerRecord, StoreError> {
        let tx = self.tx().await?;
        let result = sqlx::query_as::<_, CustomerRow>(&format!(
            r#"
            INSERT INTO customers (name, email, phone, address, city, state, country, postal_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(&fields.name)
        .bind(&fields.email)
        .bind(&fields.phone)
        .bind(&fields.address)
        .bind(&fields.city)
        .bind(&fields.state)
        .bind(&fields.country)
        .bind(&fields.postal_code)
        .fetch_one(&mut **tx)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate(fields.email))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_fields(
        &mut self,
        record: &CustomerRecord,
        fields: CustomerFields,
    ) -> Result<CustomerRecord, StoreError> {
        let tx = self.tx().await?;
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            r#"
            UPDATE customers
            SET name = $2, email = $3, phone = $4, address = $5, city = $6,
                state = $7, country = $8, postal_code = $9,
                updated_at = CASE
                    WHEN (name, email, phone, address, city, state, country, postal_code)
                        IS DISTINCT FROM ($2, $3, $4, $5, $6, $7, $8, $9)
                    THEN NOW()
                    ELSE updated_at
                END
            WHERE id = $1
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(record.id)
        .bind(&fields.name)
        .bind(&fields.email)
        .bind(&fields.phone)
        .bind(&fields.address)
        .bind(&fields.city)
        .bind(&fields.state)
        .bind(&fields.country)
        .bind(&fields.postal_code)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(CustomerRecord::from)
            .ok_or_else(|| StoreError::NotFound(record.email.clone()))
    }

    async fn list_all(&mut self) -> Result<Vec<CustomerRecord>, StoreError> {
        let tx = self.tx().await?;
        let rows = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY id"
        ))
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(CustomerRecord::from).collect())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mapper::{header_row, to_row};
    use crate::sync::memory::InMemoryTabularSource;
    use crate::sync::{DocumentRef, ReconciliationEngine};

    fn fields(name: &str, email: &str) -> CustomerFields {
        CustomerFields {
            name: name.to_string(),
            email: email.to_string(),
            phone: Some("555-0100".to_string()),
            city: Some("Albany".to_string()),
            ..Default::default()
        }
    }

    async fn committed(pool: &PgPool) -> Result<Vec<CustomerRecord>, StoreError> {
        pool.open().list_all().await
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_insert_assigns_id_and_timestamps(pool: PgPool) -> Result<(), StoreError> {
        let mut store = pool.open();
        let record = store.insert(fields("Ann", "ann@example.com")).await?;
        store.commit().await?;

        assert!(record.id > 0);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.city.as_deref(), Some("Albany"));
        assert!(record.address.is_none());
        assert!(!store.in_transaction());

        let found = pool.open().find_by_email("ann@example.com").await?;
        assert_eq!(found, Some(record));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_update_keeps_id_and_created_at(pool: PgPool) -> Result<(), StoreError> {
        let mut store = pool.open();
        let original = store.insert(fields("Ann", "ann@example.com")).await?;
        store.commit().await?;

        let mut changed = fields("Ann Updated", "ann@example.com");
        changed.city = None;
        let updated = store.update_fields(&original, changed).await?;
        store.commit().await?;

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at > original.updated_at);
        assert_eq!(updated.name, "Ann Updated");
        assert!(updated.city.is_none());
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_identical_update_keeps_updated_at(pool: PgPool) -> Result<(), StoreError> {
        let mut store = pool.open();
        let original = store.insert(fields("Ann", "ann@example.com")).await?;
        store.commit().await?;

        let same = store
            .update_fields(&original, fields("Ann", "ann@example.com"))
            .await?;
        store.commit().await?;

        assert_eq!(same, original);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_duplicate_email_is_reported(pool: PgPool) -> Result<(), StoreError> {
        let mut store = pool.open();
        store.insert(fields("Ann", "ann@example.com")).await?;

        let err = store
            .insert(fields("Other Ann", "ann@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref email) if email == "ann@example.com"));
        store.rollback().await?;
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_rollback_and_drop_discard_writes(pool: PgPool) -> Result<(), StoreError> {
        let mut store = pool.open();
        store.insert(fields("Ann", "ann@example.com")).await?;
        store.rollback().await?;

        {
            let mut dropped = pool.open();
            dropped.insert(fields("Bob", "bob@example.com")).await?;
        }

        assert!(committed(&pool).await?.is_empty());
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_list_all_is_ordered_by_id(pool: PgPool) -> Result<(), StoreError> {
        let mut store = pool.open();
        for (name, email) in [("Cy", "cy@example.com"), ("Ann", "ann@example.com")] {
            store.insert(fields(name, email)).await?;
        }
        store.commit().await?;

        let all = committed(&pool).await?;
        assert_eq!(all.len(), 2);
        assert!(all[0].id < all[1].id);
        assert_eq!(all[0].email, "cy@example.com");
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_pull_into_postgres_upserts_by_email(pool: PgPool) -> anyhow::Result<()> {
        let mut store = pool.open();
        let existing = store.insert(fields("Ann Old", "ann@example.com")).await?;
        store.commit().await?;

        let mut sheet_ann = existing.clone();
        sheet_ann.id = 999;
        sheet_ann.name = "Ann New".to_string();
        let mut sheet_bob = existing.clone();
        sheet_bob.email = "bob@example.com".to_string();

        let source = InMemoryTabularSource::new();
        source.set_rows(
            "doc",
            "Sheet1!A1:K",
            vec![header_row(), to_row(&sheet_ann), to_row(&sheet_bob)],
        );
        let engine = ReconciliationEngine::new(source, DocumentRef::new("doc", "Sheet1!A1:K"));

        let report = engine.pull_from_external(&mut pool.open()).await?;
        assert_eq!((report.inserted, report.updated), (1, 1));

        let all = committed(&pool).await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, existing.id, "sheet ID column is ignored");
        assert_eq!(all[0].name, "Ann New");
        assert_eq!(all[1].email, "bob@example.com");
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_pull_twice_leaves_unchanged_rows_alone(pool: PgPool) -> anyhow::Result<()> {
        let mut store = pool.open();
        store.insert(fields("Ann", "ann@example.com")).await?;
        store.insert(fields("Bob", "bob@example.com")).await?;
        store.commit().await?;
        let before = committed(&pool).await?;

        let source = InMemoryTabularSource::new();
        let engine =
            ReconciliationEngine::new(source.clone(), DocumentRef::new("doc", "Sheet1!A1:K"));
        engine.push_to_external(&before).await?;

        let mut doc = source.rows("doc", "Sheet1!A1:K");
        doc[2][1] = "Bob Edited".to_string();
        source.set_rows("doc", "Sheet1!A1:K", doc);
        engine.pull_from_external(&mut pool.open()).await?;

        let after = committed(&pool).await?;
        assert_eq!(after[0], before[0], "untouched row keeps updated_at");
        assert_eq!(after[1].name, "Bob Edited");
        assert!(after[1].updated_at > before[1].updated_at);
        assert_eq!(after[1].created_at, before[1].created_at);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_repeated_email_in_one_pull_keeps_later_row(pool: PgPool) -> anyhow::Result<()> {
        let row = |name: &str, city: &str| -> Vec<String> {
            ["", name, "ann@example.com", "", "", city, "", "", ""]
                .iter()
                .map(|c| c.to_string())
                .collect()
        };

        let source = InMemoryTabularSource::new();
        source.set_rows(
            "doc",
            "Sheet1!A1:K",
            vec![header_row(), row("Ann First", "Albany"), row("Ann Second", "Buffalo")],
        );
        let engine = ReconciliationEngine::new(source, DocumentRef::new("doc", "Sheet1!A1:K"));

        let report = engine.pull_from_external(&mut pool.open()).await?;
        assert_eq!((report.inserted, report.updated), (1, 1));

        let all = committed(&pool).await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Ann Second");
        assert_eq!(all[0].city.as_deref(), Some("Buffalo"));
        Ok(())
    }
}
