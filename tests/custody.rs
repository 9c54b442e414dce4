//! Checkout, return and transfer against PostgreSQL

mod common;

use futures::future::join_all;

use common::*;
use gauge_core::GaugeId;
use gauge_core::custody::TransferStatus;
use gauge_core::custody::db::CustodyDb;
use gauge_core::gauge::{GaugeRepository, GaugeStatus};
use gauge_core::{ErrorKind, GaugeError};

async fn movements(t: &TestCore, gauge_id: GaugeId) -> i64 {
    let mut conn = t.core.db().acquire().await.unwrap();
    CustodyDb::movement_count(&mut conn, gauge_id).await.unwrap()
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_checkout_and_return() {
    let t = setup().await;
    let g = available_gauge(&t.core).await;

    let record = t.core.custody.checkout(g.id, 11).await.unwrap();
    assert_eq!(record.holder_id, 11);

    let gauge = t.core.pairing.get_gauge(g.id).await.unwrap();
    assert_eq!(gauge.status, GaugeStatus::CheckedOut);
    assert_eq!(gauge.holder_id, Some(11));

    // Someone else cannot return it
    let err = t.core.custody.return_gauge(g.id, 12).await.unwrap_err();
    assert!(matches!(err, GaugeError::HolderMismatch(_)));

    let closed = t.core.custody.return_gauge(g.id, 11).await.unwrap();
    assert!(closed.returned_at.is_some());

    let gauge = t.core.pairing.get_gauge(g.id).await.unwrap();
    assert_eq!(gauge.status, GaugeStatus::Available);
    assert!(gauge.holder_id.is_none());
    assert!(t.core.custody.open_checkout(g.id).await.unwrap().is_none());

    let err = t.core.custody.return_gauge(g.id, 11).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // One movement for the checkout, one for the return
    assert_eq!(movements(&t, g.id).await, 2);
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_concurrent_checkout_exactly_one_wins() {
    let t = setup().await;
    let g = available_gauge(&t.core).await;

    let custody = &t.core.custody;
    let results = join_all((0..50).map(|holder| {
        let gauge_id = g.id;
        async move { custody.checkout(gauge_id, 1_000 + holder).await }
    }))
    .await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Conflict))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 49);

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM checkout_records WHERE gauge_id = $1 AND returned_at IS NULL",
    )
    .bind(g.id)
    .fetch_one(t.core.db().pool())
    .await
    .unwrap();
    assert_eq!(open, 1);

    let winner = results.into_iter().find_map(Result::ok).unwrap();
    let gauge = t.core.pairing.get_gauge(g.id).await.unwrap();
    assert_eq!(gauge.holder_id, Some(winner.holder_id));
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_transfer_confirm() {
    let t = setup().await;
    let g = available_gauge(&t.core).await;

    let transfer = t
        .core
        .custody
        .transfer(g.id, 21, "moving to line 4", 1)
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::Pending);

    let gauge = t.core.pairing.get_gauge(g.id).await.unwrap();
    assert_eq!(gauge.status, GaugeStatus::PendingTransfer);
    assert!(gauge.holder_id.is_none());

    // Pending transfer blocks checkout
    let err = t.core.custody.checkout(g.id, 5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let confirmed = t
        .core
        .custody
        .confirm_transfer(transfer.transfer_id, 21)
        .await
        .unwrap();
    assert_eq!(confirmed.status, TransferStatus::Confirmed);

    let gauge = t.core.pairing.get_gauge(g.id).await.unwrap();
    assert_eq!(gauge.status, GaugeStatus::Available);
    assert_eq!(gauge.holder_id, Some(21));
    assert_eq!(movements(&t, g.id).await, 1);

    // Already confirmed
    let err = t
        .core
        .custody
        .confirm_transfer(transfer.transfer_id, 21)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Same holder again is rejected
    let err = t
        .core
        .custody
        .transfer(g.id, 21, "again", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, GaugeError::InvalidInput(_)));
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_transfer_cancel_keeps_holder() {
    let t = setup().await;
    let g = available_gauge(&t.core).await;

    let transfer = t
        .core
        .custody
        .transfer(g.id, 31, "loan", 1)
        .await
        .unwrap();
    let cancelled = t
        .core
        .custody
        .cancel_transfer(transfer.transfer_id, 1)
        .await
        .unwrap();
    assert_eq!(cancelled.status, TransferStatus::Cancelled);

    let gauge = t.core.pairing.get_gauge(g.id).await.unwrap();
    assert_eq!(gauge.status, GaugeStatus::Available);
    assert!(gauge.holder_id.is_none());

    let stored = t.core.custody.get_transfer(transfer.transfer_id).await.unwrap();
    assert_eq!(stored.status, TransferStatus::Cancelled);
    assert!(stored.resolved_at.is_some());
    assert_eq!(movements(&t, g.id).await, 0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_checked_out_gauge_cannot_transfer() {
    let t = setup().await;
    let g = available_gauge(&t.core).await;
    t.core.custody.checkout(g.id, 8).await.unwrap();

    let err = t
        .core
        .custody
        .transfer(g.id, 9, "handover", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, GaugeError::GaugeUnavailable(_)));
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_retired_gauge_cannot_be_checked_out() {
    let t = setup().await;
    let g = available_gauge(&t.core).await;
    t.core.pairing.retire(g.id, 1).await.unwrap();

    let err = t.core.custody.checkout(g.id, 8).await.unwrap_err();
    assert!(matches!(err, GaugeError::GaugeUnavailable(_)));
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_lock_wait_times_out_then_recovers() {
    let t = setup().await;
    let g = available_gauge(&t.core).await;

    // Another unit of work holds the gauge row
    let mut held = t.core.db().begin().await.unwrap();
    GaugeRepository::lock(held.conn(), g.id).await.unwrap();

    let err = t.core.custody.checkout(g.id, 3).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrencyTimeout);
    assert!(err.is_retryable());
    assert!(t.core.custody.open_checkout(g.id).await.unwrap().is_none());

    held.rollback().await;

    let record = t.core.custody.checkout(g.id, 3).await.unwrap();
    assert_eq!(record.holder_id, 3);
}
