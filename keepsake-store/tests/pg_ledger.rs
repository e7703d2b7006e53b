//! Runs against a real Postgres when KEEPSAKE_TEST_DATABASE_URL is set.

use keepsake_order::fixtures::sample_draft;
use keepsake_order::{LedgerError, OrderLedger, OrderStatus, RecordOutcome};
use keepsake_store::{DbClient, PgOrderLedger};

async fn ledger() -> Option<PgOrderLedger> {
    let url = std::env::var("KEEPSAKE_TEST_DATABASE_URL").ok()?;
    let db = DbClient::new(&url).await.unwrap();
    db.migrate().await.unwrap();
    Some(PgOrderLedger::new(db.pool))
}

#[tokio::test]
async fn test_confirmation_round_trip() {
    let Some(ledger) = ledger().await else { return };

    let id = ledger.create(&sample_draft()).await.unwrap();
    let gateway_order_id = format!("order_{}", id.simple());
    ledger.record_payment_intent(id, &gateway_order_id).await.unwrap();

    assert_eq!(
        ledger.record_payment_confirmed(id, "pay_pg").await.unwrap(),
        RecordOutcome::Applied
    );
    assert_eq!(
        ledger.record_payment_confirmed(id, "pay_pg").await.unwrap(),
        RecordOutcome::Unchanged
    );
    assert!(matches!(
        ledger.record_payment_confirmed(id, "pay_other").await,
        Err(LedgerError::Conflict(_))
    ));

    let order = ledger.find_by_gateway_order(&gateway_order_id).await.unwrap();
    assert_eq!(order.id, id);
    assert_eq!(order.status, OrderStatus::PaymentConfirmed);
    assert_eq!(order.totals.total, sample_draft().total);
}
