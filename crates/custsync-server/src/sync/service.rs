//! Gate-guarded sync runs
//!
//! [`SyncService`] ties the [`RateGate`], the [`ReconciliationEngine`] and a
//! [`StoreProvider`] together. Each public run acquires one permit, does its
//! work, and finishes the permit with the outcome on every exit path.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use super::engine::{PullReport, ReconciliationEngine};
use super::ports::{RelationalStore, StoreProvider, TabularSourceAdapter};
use super::rate_gate::RateGate;
use super::status::SyncStatus;
use super::SyncError;

/// Outcome of one gated sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub op_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulled: Option<PullReport>,
    /// Data rows written to the sheet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed: Option<usize>,
    pub duration_ms: u128,
}

pub struct SyncService<A, P> {
    gate: Arc<RateGate>,
    engine: Arc<ReconciliationEngine<A>>,
    stores: Arc<P>,
}

impl<A, P> Clone for SyncService<A, P> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            engine: Arc::clone(&self.engine),
            stores: Arc::clone(&self.stores),
        }
    }
}

impl<A, P> SyncService<A, P>
where
    A: TabularSourceAdapter + 'static,
    P: StoreProvider,
{
    pub fn new(gate: Arc<RateGate>, engine: ReconciliationEngine<A>, stores: P) -> Self {
        Self {
            gate,
            engine: Arc::new(engine),
            stores: Arc::new(stores),
        }
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    pub fn engine(&self) -> &ReconciliationEngine<A> {
        &self.engine
    }

    pub fn status(&self, op_class: &str) -> SyncStatus {
        self.gate.tracker().status(op_class)
    }

    /// Pull the sheet into the store, then push the full store to the sheet.
    ///
    /// The pull commits before the push starts, so a failed push does not
    /// undo the merged rows.
    #[instrument(skip(self))]
    pub async fn sync_bidirectional(&self, op_class: &str) -> Result<SyncReport, SyncError> {
        let permit = self.gate.try_start(op_class)?;
        let started = Instant::now();

        let outcome = async {
            let mut store = self.stores.open();
            let pulled = self.engine.pull_from_external(&mut store).await?;
            let pushed = self.push_all(&mut store).await?;
            Ok::<_, SyncError>((pulled, pushed))
        }
        .await;

        permit.finish_with(&outcome);
        let (pulled, pushed) = outcome?;

        let report = SyncReport {
            op_class: op_class.to_string(),
            pulled: Some(pulled),
            pushed: Some(pushed),
            duration_ms: started.elapsed().as_millis(),
        };
        info!(duration_ms = report.duration_ms as u64, "bidirectional sync completed");
        Ok(report)
    }

    /// Merge the sheet into the store
    #[instrument(skip(self))]
    pub async fn pull(&self, op_class: &str) -> Result<SyncReport, SyncError> {
        let permit = self.gate.try_start(op_class)?;
        let started = Instant::now();

        let mut store = self.stores.open();
        let outcome = self.engine.pull_from_external(&mut store).await;
        permit.finish_with(&outcome);

        Ok(SyncReport {
            op_class: op_class.to_string(),
            pulled: Some(outcome?),
            pushed: None,
            duration_ms: started.elapsed().as_millis(),
        })
    }

    /// Replace the sheet with every stored customer
    #[instrument(skip(self))]
    pub async fn push(&self, op_class: &str) -> Result<SyncReport, SyncError> {
        let permit = self.gate.try_start(op_class)?;
        let started = Instant::now();

        let mut store = self.stores.open();
        let outcome = self.push_all(&mut store).await;
        permit.finish_with(&outcome);

        Ok(SyncReport {
            op_class: op_class.to_string(),
            pulled: None,
            pushed: Some(outcome?),
            duration_ms: started.elapsed().as_millis(),
        })
    }

    /// Fire-and-forget bidirectional sync after a customer mutation.
    ///
    /// Busy and RateLimited are expected here and only logged at debug; the
    /// next trigger or a manual sync picks the change up.
    pub fn trigger_after_mutation(&self, op_class: &str) -> JoinHandle<()> {
        let service = self.clone();
        let op_class = op_class.to_string();

        tokio::spawn(async move {
            match service.sync_bidirectional(&op_class).await {
                Ok(report) => debug!(op_class = %op_class, ?report, "automatic sync finished"),
                Err(e) if e.is_retry_later() => {
                    debug!(op_class = %op_class, reason = %e, "automatic sync deferred")
                }
                Err(e) => error!(op_class = %op_class, error = %e, "automatic sync failed"),
            }
        })
    }

    async fn push_all(&self, store: &mut P::Store) -> Result<usize, SyncError> {
        let records = store.list_all().await?;
        self.engine.push_to_external(&records).await
    }
}
