//! Companion integrity sweep against PostgreSQL

mod common;

use common::*;
use gauge_core::reconciliation::ViolationKind;
use gauge_core::{ErrorKind, GaugeError};

async fn open_violations(t: &TestCore, gauge_id: i64) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM integrity_violations WHERE gauge_id = $1 AND resolved_at IS NULL",
    )
    .bind(gauge_id)
    .fetch_one(t.core.db().pool())
    .await
    .unwrap()
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_sweep_reports_asymmetric_link() {
    let t = setup().await;
    let spec = unc_spec(fresh_category());
    let set = t.core.pairing.create_set(&spec, &spec, 1).await.unwrap();
    let (a, b) = (set.go_gauge.id, set.no_go_gauge.id);

    // Break one side behind the service's back
    sqlx::query("UPDATE gauges SET companion_gauge_id = NULL WHERE id = $1")
        .bind(b)
        .execute(t.core.db().pool())
        .await
        .unwrap();

    let worker = t.core.reconciliation_worker(&test_config());
    let found = worker.sweep().await.unwrap();
    let ours: Vec<_> = found.iter().filter(|v| v.gauge_id == a).collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].kind, ViolationKind::AsymmetricCompanion);
    assert_eq!(ours[0].link.target_companion_id, Some(None));

    // Recorded once no matter how often it is seen
    worker.sweep().await.unwrap();
    assert_eq!(open_violations(&t, a).await, 1);

    // Both gauge rows are kept as found
    let before_state: serde_json::Value = sqlx::query_scalar(
        "SELECT before_state FROM integrity_violations WHERE gauge_id = $1 AND resolved_at IS NULL",
    )
    .bind(a)
    .fetch_one(t.core.db().pool())
    .await
    .unwrap();
    assert_eq!(before_state["gauge"]["id"], a);
    assert_eq!(before_state["gauge"]["companion_gauge_id"], b);
    assert_eq!(before_state["gauge"]["business_id"], set.go_gauge.business_id.as_str());
    assert_eq!(before_state["companion"]["id"], b);
    assert!(before_state["companion"]["companion_gauge_id"].is_null());

    // The service refuses to touch the broken pair
    let err = t.core.pairing.unpair(a, 1).await.unwrap_err();
    assert!(matches!(err, GaugeError::IntegrityViolation(_)));
    assert_eq!(err.kind(), ErrorKind::IntegrityViolation);
    let still = t.core.pairing.get_gauge(a).await.unwrap();
    assert_eq!(still.companion_gauge_id, Some(b));

    // Once repaired, the pair behaves normally again
    sqlx::query("UPDATE gauges SET companion_gauge_id = $1 WHERE id = $2")
        .bind(a)
        .bind(b)
        .execute(t.core.db().pool())
        .await
        .unwrap();
    let found = worker.sweep().await.unwrap();
    assert!(found.iter().all(|v| v.gauge_id != a && v.gauge_id != b));
    t.core.pairing.unpair(a, 1).await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_sweep_ignores_consistent_pairs() {
    let t = setup().await;
    let spec = unc_spec(fresh_category());
    let set = t.core.pairing.create_set(&spec, &spec, 1).await.unwrap();

    let found = t
        .core
        .reconciliation_worker(&test_config())
        .sweep()
        .await
        .unwrap();
    assert!(
        found
            .iter()
            .all(|v| v.gauge_id != set.go_gauge.id && v.gauge_id != set.no_go_gauge.id)
    );
}
