//! Per-class mutual exclusion and start-rate limiting
//!
//! The limiter is coarse on purpose: a class may start at most once per
//! window, measured from the previous start. It keeps sync frequency under the
//! Sheets API quota without counting individual requests.

use std::sync::Arc;
use std::time::Duration;

use super::status::SyncStatusTracker;
use super::GateRejection;

/// Error recorded when a permit is dropped without an explicit finish
pub const ABANDONED_SYNC_ERROR: &str = "sync aborted before completion";

/// Entry point for every sync trigger
#[derive(Debug, Clone)]
pub struct RateGate {
    tracker: Arc<SyncStatusTracker>,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(Arc::new(SyncStatusTracker::default()))
    }
}

impl RateGate {
    pub fn new(tracker: Arc<SyncStatusTracker>) -> Self {
        Self { tracker }
    }

    pub fn with_window(window: Duration) -> Self {
        Self::new(Arc::new(SyncStatusTracker::new(window)))
    }

    pub fn tracker(&self) -> &Arc<SyncStatusTracker> {
        &self.tracker
    }

    /// Ask to start a sync of `op_class`.
    ///
    /// On success the returned [`SyncPermit`] owns the in-progress flag until
    /// it is finished or dropped.
    pub fn try_start(&self, op_class: &str) -> Result<SyncPermit, GateRejection> {
        match self.tracker.start(op_class) {
            Ok(()) => {
                tracing::debug!(op_class, "sync permit granted");
                Ok(SyncPermit {
                    tracker: Arc::clone(&self.tracker),
                    op_class: op_class.to_string(),
                    finished: false,
                })
            }
            Err(rejection) => {
                tracing::debug!(op_class, %rejection, "sync permit refused");
                Err(rejection)
            }
        }
    }

    /// Clear in-progress for `op_class` and record `error` (or clear it).
    ///
    /// Callers holding a [`SyncPermit`] should finish the permit instead.
    pub fn finish(&self, op_class: &str, error: Option<String>) {
        self.tracker.end(op_class, error);
    }
}

/// Scoped ownership of one in-progress sync.
///
/// Finishing consumes the permit. A permit dropped unfinished (early return,
/// `?`, panic unwinding) releases the class and records
/// [`ABANDONED_SYNC_ERROR`].
#[derive(Debug)]
#[must_use = "dropping a permit immediately ends the sync"]
pub struct SyncPermit {
    tracker: Arc<SyncStatusTracker>,
    op_class: String,
    finished: bool,
}

impl SyncPermit {
    pub fn op_class(&self) -> &str {
        &self.op_class
    }

    pub fn finish(mut self, error: Option<String>) {
        self.finished = true;
        self.tracker.end(&self.op_class, error);
    }

    /// Finish with the outcome of the guarded operation
    pub fn finish_with<T, E: std::fmt::Display>(self, outcome: &Result<T, E>) {
        let error = outcome.as_ref().err().map(|e| e.to_string());
        self.finish(error);
    }
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(op_class = %self.op_class, "sync permit dropped without finish");
            self.tracker
                .end(&self.op_class, Some(ABANDONED_SYNC_ERROR.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_busy_then_rate_limited_then_ok() {
        let gate = RateGate::default();

        let permit = gate.try_start("customers").unwrap();
        assert!(matches!(
            gate.try_start("customers"),
            Err(GateRejection::Busy { .. })
        ));

        permit.finish(None);
        assert!(matches!(
            gate.try_start("customers"),
            Err(GateRejection::RateLimited { .. })
        ));

        tokio::time::advance(Duration::from_secs(61)).await;
        let permit = gate.try_start("customers").unwrap();
        permit.finish(None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_classes_run_concurrently() {
        let gate = RateGate::default();
        let customers = gate.try_start("customers").unwrap();
        let sheets = gate.try_start("sheets").unwrap();

        assert!(gate.tracker().status("customers").in_progress);
        assert!(gate.tracker().status("sheets").in_progress);

        customers.finish(None);
        sheets.finish(None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_still_counts_for_window() {
        let gate = RateGate::default();
        gate.try_start("customers")
            .unwrap()
            .finish(Some("sheet unreachable".to_string()));

        assert!(matches!(
            gate.try_start("customers"),
            Err(GateRejection::RateLimited { .. })
        ));
        assert_eq!(
            gate.tracker().status("customers").error.as_deref(),
            Some("sheet unreachable")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_permit_releases_class_and_records_error() {
        let gate = RateGate::with_window(Duration::from_secs(5));
        {
            let _permit = gate.try_start("customers").unwrap();
        }

        let status = gate.tracker().status("customers");
        assert!(!status.in_progress);
        assert_eq!(status.error.as_deref(), Some(ABANDONED_SYNC_ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_released_when_guarded_task_panics() {
        let gate = RateGate::default();
        let permit = gate.try_start("customers").unwrap();

        let handle = tokio::spawn(async move {
            let _held = permit;
            panic!("boom mid-sync");
        });
        assert!(handle.await.is_err());

        assert!(!gate.tracker().status("customers").in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_with_records_display_of_error() {
        let gate = RateGate::default();
        let permit = gate.try_start("customers").unwrap();
        let outcome: Result<(), String> = Err("502 from sheets".to_string());
        permit.finish_with(&outcome);

        assert_eq!(
            gate.tracker().status("customers").error.as_deref(),
            Some("502 from sheets")
        );
    }

    #[tokio::test]
    async fn test_concurrent_starts_grant_exactly_one_permit() {
        let gate = Arc::new(RateGate::default());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                gate.try_start("customers").map(std::mem::forget).is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }
}
