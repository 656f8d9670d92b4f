//! Process-wide sync state, keyed by operation class
//!
//! [`SyncStatusTracker`] is the only owner of per-class state. The
//! [`RateGate`](super::rate_gate::RateGate) changes it through
//! [`SyncStatusTracker::start`] and [`SyncStatusTracker::end`]; everything else
//! reads the [`SyncStatus`] projection.
//!
//! State lives in a [`DashMap`], so a start on one class only contends with
//! other calls that land on the same shard, and the check-then-mark in
//! `start` runs under that key's entry lock.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use super::GateRejection;

/// Default spacing between two starts of the same operation class.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Default external API request budget per window.
///
/// Informational: the gate bounds how often a class may start, it does not
/// count individual requests against this budget.
pub const DEFAULT_MAX_REQUESTS_PER_WINDOW: u32 = 60;

/// State of one operation class
#[derive(Debug, Clone, Default)]
pub struct SyncOperation {
    pub in_progress: bool,
    /// Wall-clock time of the last successful `start`
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Monotonic twin of `last_attempt`, used for the rate window
    started_at: Option<Instant>,
}

impl SyncOperation {
    fn window_remaining(&self, now: Instant, window: Duration) -> Option<Duration> {
        let started = self.started_at?;
        let elapsed = now.saturating_duration_since(started);
        (elapsed < window).then(|| window - elapsed)
    }
}

/// Status projection served to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub in_progress: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// True when the rate window since the last start has elapsed
    pub can_sync: bool,
}

#[derive(Debug)]
pub struct SyncStatusTracker {
    operations: DashMap<String, SyncOperation>,
    window: Duration,
    max_requests_per_window: u32,
}

impl Default for SyncStatusTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW)
    }
}

impl SyncStatusTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            operations: DashMap::new(),
            window,
            max_requests_per_window: DEFAULT_MAX_REQUESTS_PER_WINDOW,
        }
    }

    pub fn with_request_budget(mut self, max_requests_per_window: u32) -> Self {
        self.max_requests_per_window = max_requests_per_window;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests_per_window(&self) -> u32 {
        self.max_requests_per_window
    }

    /// Mark `op_class` in progress if it is idle and outside its rate window.
    ///
    /// Busy takes precedence over RateLimited. The window is measured from the
    /// previous start, whether or not that attempt succeeded.
    pub(crate) fn start(&self, op_class: &str) -> Result<(), GateRejection> {
        let now = Instant::now();
        let mut op = self.operations.entry(op_class.to_string()).or_default();

        if op.in_progress {
            return Err(GateRejection::Busy {
                op_class: op_class.to_string(),
            });
        }

        if let Some(retry_after) = op.window_remaining(now, self.window) {
            return Err(GateRejection::RateLimited {
                op_class: op_class.to_string(),
                retry_after,
            });
        }

        op.in_progress = true;
        op.started_at = Some(now);
        op.last_attempt = Some(Utc::now());
        Ok(())
    }

    /// Clear in-progress and record (or clear) the last error.
    pub(crate) fn end(&self, op_class: &str, error: Option<String>) {
        let mut op = self.operations.entry(op_class.to_string()).or_default();
        op.in_progress = false;
        op.last_error = error;
    }

    /// Snapshot of one class. Unknown classes report idle and syncable.
    pub fn status(&self, op_class: &str) -> SyncStatus {
        match self.operations.get(op_class) {
            Some(op) => SyncStatus {
                in_progress: op.in_progress,
                last_sync: op.last_attempt,
                error: op.last_error.clone(),
                can_sync: op.window_remaining(Instant::now(), self.window).is_none(),
            },
            None => SyncStatus {
                in_progress: false,
                last_sync: None,
                error: None,
                can_sync: true,
            },
        }
    }

    /// Raw state of one class, if it has ever been referenced
    pub fn operation(&self, op_class: &str) -> Option<SyncOperation> {
        self.operations.get(op_class).map(|op| op.clone())
    }
}
