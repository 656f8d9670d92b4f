//! RateGate behaviour as seen by callers

mod common;

use common::*;
use custsync_server::sync::{
    memory::{InMemoryCustomerDb, InMemoryTabularSource},
    GateRejection, RateGate, SyncError, SyncService, CUSTOMERS_OP_CLASS, SHEETS_OP_CLASS,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_start_busy_finish_rate_limited_then_open() {
    let gate = RateGate::default();

    let permit = gate.try_start(CUSTOMERS_OP_CLASS).unwrap();
    assert_eq!(
        gate.try_start(CUSTOMERS_OP_CLASS).unwrap_err(),
        GateRejection::Busy {
            op_class: CUSTOMERS_OP_CLASS.to_string()
        }
    );

    permit.finish(None);
    assert!(matches!(
        gate.try_start(CUSTOMERS_OP_CLASS),
        Err(GateRejection::RateLimited { .. })
    ));

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(gate.try_start(CUSTOMERS_OP_CLASS).is_err());

    tokio::time::advance(Duration::from_secs(1)).await;
    let permit = gate.try_start(CUSTOMERS_OP_CLASS).unwrap();
    permit.finish(None);
}

#[tokio::test(start_paused = true)]
async fn test_classes_do_not_block_each_other() {
    let gate = RateGate::default();

    let customers = gate.try_start(CUSTOMERS_OP_CLASS).unwrap();
    let sheets = gate.try_start(SHEETS_OP_CLASS).unwrap();

    assert!(gate.tracker().status(CUSTOMERS_OP_CLASS).in_progress);
    assert!(gate.tracker().status(SHEETS_OP_CLASS).in_progress);

    customers.finish(None);
    sheets.finish(Some("quota exceeded".to_string()));

    assert!(gate.tracker().status(CUSTOMERS_OP_CLASS).error.is_none());
    assert_eq!(
        gate.tracker().status(SHEETS_OP_CLASS).error.as_deref(),
        Some("quota exceeded")
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_manual_syncs_admit_exactly_one() {
    let source = InMemoryTabularSource::new();
    source.set_read_delay(Duration::from_secs(2));
    let db = InMemoryCustomerDb::new();
    let svc = service(&source, &db);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = svc.clone();
            tokio::spawn(async move { svc.sync_bidirectional(CUSTOMERS_OP_CLASS).await })
        })
        .collect();

    let mut ok = 0;
    let mut busy = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(SyncError::Rejected(GateRejection::Busy { .. })) => busy += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(busy, 7);
    assert!(!svc.status(CUSTOMERS_OP_CLASS).in_progress);
}

#[tokio::test(start_paused = true)]
async fn test_shared_gate_spans_services() {
    let gate = Arc::new(RateGate::default());
    let source = InMemoryTabularSource::new();
    let db = InMemoryCustomerDb::new();
    let first = SyncService::new(Arc::clone(&gate), engine(&source), db.clone());
    let second = SyncService::new(Arc::clone(&gate), engine(&source), db);

    first.push(CUSTOMERS_OP_CLASS).await.unwrap();
    let err = second.pull(CUSTOMERS_OP_CLASS).await.unwrap_err();
    assert!(err.is_retry_later());
}
