use async_trait::async_trait;
use keepsake_core::FailureDetail;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Order, OrderDraft, OrderStatus, PickupRecord, RecordOutcome, ShipmentRecord, StageMutation, StageResult,
};

/// An order that breaks one of the cross-entity invariants
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InvariantViolation {
    pub order_id: Uuid,
    pub violation: String,
}

/// Durable record of every checkout, keyed by order id.
///
/// Implementations only need `create`, `apply` and the reads; the per-stage
/// `record_*` helpers all funnel into `apply`, which must run
/// [`Order::apply`] atomically for one order.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Open an order in `PENDING_PAYMENT` for a validated draft
    async fn create(&self, draft: &OrderDraft) -> LedgerResult<Uuid>;

    /// Persist one stage outcome; idempotent per order and stage
    async fn apply(&self, order_id: Uuid, mutation: StageMutation) -> LedgerResult<RecordOutcome>;

    async fn get(&self, order_id: Uuid) -> LedgerResult<Order>;

    async fn find_by_gateway_order(&self, gateway_order_id: &str) -> LedgerResult<Order>;

    async fn list_by_status(&self, status: OrderStatus) -> LedgerResult<Vec<Order>>;

    async fn list_all(&self) -> LedgerResult<Vec<Order>>;

    async fn record_payment_intent(&self, order_id: Uuid, gateway_order_id: &str) -> LedgerResult<RecordOutcome> {
        self.apply(order_id, StageMutation::PaymentIntent { gateway_order_id: gateway_order_id.to_string() })
            .await
    }

    async fn record_payment_confirmed(&self, order_id: Uuid, payment_reference: &str) -> LedgerResult<RecordOutcome> {
        self.apply(
            order_id,
            StageMutation::PaymentConfirmed { payment_reference: payment_reference.to_string() },
        )
        .await
    }

    async fn record_payment_failed(&self, order_id: Uuid, detail: FailureDetail) -> LedgerResult<RecordOutcome> {
        self.apply(order_id, StageMutation::PaymentFailed(detail))
            .await
    }

    async fn record_confirmation_rejected(&self, order_id: Uuid, reason: &str) -> LedgerResult<RecordOutcome> {
        self.apply(order_id, StageMutation::ConfirmationRejected { reason: reason.to_string() })
            .await
    }

    async fn record_shipment(&self, order_id: Uuid, outcome: StageResult<ShipmentRecord>) -> LedgerResult<RecordOutcome> {
        self.apply(order_id, StageMutation::Shipment(outcome)).await
    }

    async fn record_pickup(&self, order_id: Uuid, outcome: StageResult<PickupRecord>) -> LedgerResult<RecordOutcome> {
        self.apply(order_id, StageMutation::Pickup(outcome)).await
    }

    async fn record_fulfilled(&self, order_id: Uuid) -> LedgerResult<RecordOutcome> {
        self.apply(order_id, StageMutation::Fulfilled).await
    }

    /// Scan every order for invariant violations
    async fn audit(&self) -> LedgerResult<Vec<InvariantViolation>> {
        let orders = self.list_all().await?;
        Ok(orders
            .iter()
            .flat_map(|order| {
                order
                    .invariant_violations()
                    .into_iter()
                    .map(move |violation| InvariantViolation { order_id: order.id, violation })
            })
            .collect())
    }
}

#[derive(Default)]
struct LedgerState {
    orders: HashMap<Uuid, Order>,
    by_gateway: HashMap<String, Uuid>,
}

/// Process-local ledger; one write lock per stage write keeps each upsert atomic.
#[derive(Default)]
pub struct InMemoryOrderLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn create(&self, draft: &OrderDraft) -> LedgerResult<Uuid> {
        let order = Order::open(draft)?;
        let id = order.id;

        let mut state = self.state.write().await;
        state.orders.insert(id, order);
        debug!("Ledger opened order {}", id);
        Ok(id)
    }

    async fn apply(&self, order_id: Uuid, mutation: StageMutation) -> LedgerResult<RecordOutcome> {
        let mut state = self.state.write().await;

        if let StageMutation::PaymentIntent { gateway_order_id } = &mutation {
            if let Some(owner) = state.by_gateway.get(gateway_order_id) {
                if *owner != order_id {
                    return Err(LedgerError::Conflict(format!(
                        "gateway order {} already belongs to order {}",
                        gateway_order_id, owner
                    )));
                }
            }
        }

        let gateway_key = match &mutation {
            StageMutation::PaymentIntent { gateway_order_id } => Some(gateway_order_id.clone()),
            _ => None,
        };

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(LedgerError::NotFound(order_id))?;
        let outcome = order.apply(mutation)?;

        if let (RecordOutcome::Applied, Some(key)) = (outcome, gateway_key) {
            state.by_gateway.insert(key, order_id);
        }

        Ok(outcome)
    }

    async fn get(&self, order_id: Uuid) -> LedgerResult<Order> {
        let state = self.state.read().await;
        state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(LedgerError::NotFound(order_id))
    }

    async fn find_by_gateway_order(&self, gateway_order_id: &str) -> LedgerResult<Order> {
        let state = self.state.read().await;
        state
            .by_gateway
            .get(gateway_order_id)
            .and_then(|id| state.orders.get(id))
            .cloned()
            .ok_or_else(|| LedgerError::UnknownGatewayOrder(gateway_order_id.to_string()))
    }

    async fn list_by_status(&self, status: OrderStatus) -> LedgerResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn list_all(&self) -> LedgerResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state.orders.values().cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_draft;
    use crate::models::Dimensions;
    use chrono::Utc;
    use keepsake_core::FailureDetail;
    use std::sync::Arc;

    fn shipment(order_id: Uuid) -> ShipmentRecord {
        ShipmentRecord {
            order_id,
            tracking_id: "AWB123".into(),
            carrier_status: "Manifested".into(),
            weight_grams: 750.0,
            dimensions: Dimensions { length_cm: 20.0, width_cm: 15.0, height_cm: 10.0 },
            created_at: Utc::now(),
        }
    }

    async fn confirmed(ledger: &InMemoryOrderLedger) -> Uuid {
        let id = ledger.create(&sample_draft()).await.unwrap();
        ledger.record_payment_intent(id, "order_abc").await.unwrap();
        ledger.record_payment_confirmed(id, "pay_abc").await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_create_keeps_draft_totals() {
        let ledger = InMemoryOrderLedger::new();
        let id = ledger.create(&sample_draft()).await.unwrap();

        let order = ledger.get(id).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.totals.total, order.totals.subtotal + order.totals.shipping_fee + order.totals.tax);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_draft() {
        let ledger = InMemoryOrderLedger::new();
        let mut draft = sample_draft();
        draft.items.clear();

        assert!(matches!(ledger.create(&draft).await, Err(LedgerError::InvalidDraft(_))));
        assert!(ledger.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_gateway_order() {
        let ledger = InMemoryOrderLedger::new();
        let id = ledger.create(&sample_draft()).await.unwrap();
        ledger.record_payment_intent(id, "order_abc").await.unwrap();

        assert_eq!(ledger.find_by_gateway_order("order_abc").await.unwrap().id, id);
        assert!(matches!(
            ledger.find_by_gateway_order("order_zzz").await,
            Err(LedgerError::UnknownGatewayOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_gateway_order_cannot_be_shared() {
        let ledger = InMemoryOrderLedger::new();
        let first = ledger.create(&sample_draft()).await.unwrap();
        let second = ledger.create(&sample_draft()).await.unwrap();

        ledger.record_payment_intent(first, "order_abc").await.unwrap();
        let result = ledger.record_payment_intent(second, "order_abc").await;
        assert!(matches!(result, Err(LedgerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_record_shipment_is_idempotent() {
        let ledger = InMemoryOrderLedger::new();
        let id = confirmed(&ledger).await;
        let record = shipment(id);

        let first = ledger.record_shipment(id, Ok(record.clone())).await.unwrap();
        let once = ledger.get(id).await.unwrap();
        let second = ledger.record_shipment(id, Ok(record)).await.unwrap();
        let twice = ledger.get(id).await.unwrap();

        assert_eq!(first, RecordOutcome::Applied);
        assert_eq!(second, RecordOutcome::Unchanged);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_pickup_without_shipment_is_refused() {
        let ledger = InMemoryOrderLedger::new();
        let id = confirmed(&ledger).await;

        let result = ledger
            .record_pickup(id, Err(FailureDetail::transport("timeout")))
            .await;
        assert!(matches!(result, Err(LedgerError::PreconditionViolated(_))));
        assert!(ledger.audit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_confirmations_apply_once() {
        let ledger = Arc::new(InMemoryOrderLedger::new());
        let id = ledger.create(&sample_draft()).await.unwrap();
        ledger.record_payment_intent(id, "order_abc").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.record_payment_confirmed(id, "pay_abc").await.unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() == RecordOutcome::Applied {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);

        let order = ledger.get(id).await.unwrap();
        let confirmations = order
            .history
            .iter()
            .filter(|e| matches!(e.outcome, crate::models::StageOutcome::Confirmed { .. }))
            .count();
        assert_eq!(confirmations, 1);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let ledger = InMemoryOrderLedger::new();
        let id = confirmed(&ledger).await;
        ledger
            .record_shipment(id, Err(FailureDetail::business("carrier_rejected")))
            .await
            .unwrap();
        ledger.create(&sample_draft()).await.unwrap();

        let manual = ledger.list_by_status(OrderStatus::ManualFulfillmentRequired).await.unwrap();
        assert_eq!(manual.len(), 1);
        assert_eq!(manual[0].id, id);
    }
}
