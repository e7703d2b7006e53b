use chrono::{Duration, Utc};
use keepsake_core::carrier::PaymentMode;
use keepsake_core::events::FulfillmentEvents;
use keepsake_core::payment::{PaymentConfirmation, SignatureVerifier};
use keepsake_core::status::{OrderStatusNotifier, OrderStatusUpdate};
use keepsake_core::FailureDetail;
use keepsake_shared::models::events::{
    FulfillmentEvent, ManualFulfillmentRequiredEvent, OrderFulfilledEvent, PaymentConfirmedEvent,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{DraftError, LedgerError};
use crate::ledger::OrderLedger;
use crate::models::{
    Dimensions, DraftItem, Order, OrderDraft, OrderStatus, PickupRecord, RecordOutcome, ShipmentRecord, Stage,
};
use crate::payment::{IntentMetadata, PaymentIntentError, PaymentIntentService};
use crate::pickup::{pickup_window, PickupService};
use crate::shipment::{ShipmentRequest, ShipmentService};

/// The only message a shopper sees once payment went through
pub const SHOPPER_MESSAGE: &str = "Order received, processing";

/// Carrier status stored for a shipment recorded from its AWB after the fact
const RECOVERED_STATUS: &str = "RECOVERED";

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    InvalidInput(#[from] DraftError),

    #[error("Payment could not be started, please try again: {0}")]
    PaymentIntent(#[from] PaymentIntentError),

    #[error("Payment confirmation rejected: {0}")]
    AuthenticationFailure(String),

    #[error("Order {order_id} cannot be replayed: {reason}")]
    InvalidState { order_id: Uuid, reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Parcel assumptions applied to every shipment
#[derive(Debug, Clone)]
pub struct ParcelSpec {
    pub grams_per_item: f64,
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    pub currency: String,
    pub parcel: ParcelSpec,
    pub pickup_lead_days: u32,
    pub payment_mode: PaymentMode,
    /// Used when an order somehow carries no item titles
    pub product_label_fallback: String,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            parcel: ParcelSpec {
                grams_per_item: 250.0,
                dimensions: Dimensions { length_cm: 20.0, width_cm: 15.0, height_cm: 10.0 },
            },
            pickup_lead_days: 1,
            payment_mode: PaymentMode::Prepaid,
            product_label_fallback: "Personalized gift".to_string(),
        }
    }
}

/// Everything the orchestrator talks to
pub struct Collaborators {
    pub ledger: Arc<dyn OrderLedger>,
    pub payments: PaymentIntentService,
    pub shipments: ShipmentService,
    pub pickups: PickupService,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub notifier: Arc<dyn OrderStatusNotifier>,
    pub events: Arc<dyn FulfillmentEvents>,
}

/// Returned to the storefront so it can open the gateway checkout
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckoutSession {
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FulfillmentReport {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub tracking_id: Option<String>,
    pub pickup_id: Option<String>,
    pub shopper_message: String,
    /// Back-office flag; the storefront response leaves it out
    pub follow_up_required: bool,
}

impl From<&Order> for FulfillmentReport {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            tracking_id: order.tracking_id().map(str::to_string),
            pickup_id: order.pickup_id().map(str::to_string),
            shopper_message: SHOPPER_MESSAGE.to_string(),
            follow_up_required: order.status == OrderStatus::ManualFulfillmentRequired,
        }
    }
}

/// Carrier product label: first title plus a count of the remaining lines
pub fn product_label(items: &[DraftItem], fallback: &str) -> String {
    match items.split_first() {
        Some((first, rest)) if !first.title.trim().is_empty() => {
            if rest.is_empty() {
                first.title.clone()
            } else {
                format!("{} +{} more", first.title, rest.len())
            }
        }
        _ => fallback.to_string(),
    }
}

/// Drives one order from checkout to a booked pickup.
///
/// Holds no per-order state; everything it knows about an order comes from
/// the ledger, and every stage outcome goes back to the ledger before the
/// next stage starts.
pub struct FulfillmentOrchestrator {
    ledger: Arc<dyn OrderLedger>,
    payments: PaymentIntentService,
    shipments: ShipmentService,
    pickups: PickupService,
    verifier: Arc<dyn SignatureVerifier>,
    notifier: Arc<dyn OrderStatusNotifier>,
    events: Arc<dyn FulfillmentEvents>,
    settings: FulfillmentSettings,
}

impl FulfillmentOrchestrator {
    pub fn new(collaborators: Collaborators, settings: FulfillmentSettings) -> Self {
        Self {
            ledger: collaborators.ledger,
            payments: collaborators.payments,
            shipments: collaborators.shipments,
            pickups: collaborators.pickups,
            verifier: collaborators.verifier,
            notifier: collaborators.notifier,
            events: collaborators.events,
            settings,
        }
    }

    pub fn ledger(&self) -> Arc<dyn OrderLedger> {
        self.ledger.clone()
    }

    pub fn settings(&self) -> &FulfillmentSettings {
        &self.settings
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    /// Open an order and reserve its amount with the gateway
    pub async fn begin_checkout(&self, draft: &OrderDraft) -> Result<CheckoutSession, OrchestratorError> {
        // 1. Reject bad drafts before anything external happens
        let totals = draft.validate()?;
        let currency = draft
            .currency
            .clone()
            .unwrap_or_else(|| self.settings.currency.clone());
        self.payments.validate(totals.total, &currency).map_err(|e| match e {
            PaymentIntentError::InvalidAmount(amount) => OrchestratorError::InvalidInput(DraftError::InvalidAmount(amount)),
            PaymentIntentError::UnsupportedCurrency(c) => OrchestratorError::InvalidInput(DraftError::UnsupportedCurrency(c)),
            other => OrchestratorError::PaymentIntent(other),
        })?;

        // 2. Durable record first, so a gateway order always has an owner
        let mut draft = draft.clone();
        draft.currency = Some(currency.clone());
        let order_id = self.ledger.create(&draft).await?;

        // 3. Gateway order, receipt = our order id
        let metadata = IntentMetadata::for_order(order_id, &draft);
        match self.payments.create_intent(totals.total, &currency, metadata).await {
            Ok(intent) => {
                self.ledger
                    .record_payment_intent(order_id, &intent.gateway_order_id)
                    .await?;
                info!("Checkout opened for order {} (gateway order {})", order_id, intent.gateway_order_id);
                Ok(CheckoutSession {
                    order_id,
                    gateway_order_id: intent.gateway_order_id,
                    amount_minor_units: intent.amount_minor_units,
                    currency: intent.currency,
                })
            }
            Err(e) => {
                warn!("Payment intent for order {} failed: {}", order_id, e);
                self.ledger.record_payment_failed(order_id, e.to_failure()).await?;
                Err(OrchestratorError::PaymentIntent(e))
            }
        }
    }

    // ========================================================================
    // Payment confirmation
    // ========================================================================

    /// Handle the gateway callback and run the logistics stages.
    ///
    /// Every post-payment outcome, manual fulfillment included, is a success
    /// for the shopper; `follow_up_required` tells back-office apart.
    pub async fn confirm_payment(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<FulfillmentReport, OrchestratorError> {
        // 1. Correlate
        let order = self
            .ledger
            .find_by_gateway_order(&confirmation.gateway_order_id)
            .await?;

        // 2. Authenticate
        if !self.verifier.verify(confirmation) {
            error!(
                "Signature verification failed for order {} (gateway order {})",
                order.id, confirmation.gateway_order_id
            );
            if let Err(e) = self
                .ledger
                .record_confirmation_rejected(order.id, "signature verification failed")
                .await
            {
                warn!("Could not record rejected confirmation for order {}: {}", order.id, e);
            }
            return Err(OrchestratorError::AuthenticationFailure(format!(
                "invalid signature for gateway order {}",
                confirmation.gateway_order_id
            )));
        }

        // 3. Persist the confirmation before any carrier call
        let outcome = self
            .ledger
            .record_payment_confirmed(order.id, &confirmation.gateway_payment_id)
            .await?;
        if outcome == RecordOutcome::Unchanged {
            let report = self.report(order.id).await?;
            if report.status == OrderStatus::PaymentConfirmed {
                // Either still in flight or stalled before any shipment outcome was written
                warn!(
                    "Confirmation redelivered for order {} with no shipment outcome on record; check PAYMENT_CONFIRMED orders",
                    order.id
                );
                return Ok(FulfillmentReport { follow_up_required: true, ..report });
            }
            info!("Duplicate confirmation for order {}, nothing to do", order.id);
            return Ok(report);
        }
        info!("Payment {} confirmed for order {}", confirmation.gateway_payment_id, order.id);

        self.emit(FulfillmentEvent::PaymentConfirmed(PaymentConfirmedEvent {
            order_id: order.id,
            gateway_order_id: confirmation.gateway_order_id.clone(),
            payment_reference: confirmation.gateway_payment_id.clone(),
            timestamp: Utc::now().timestamp(),
        }))
        .await;

        // 4. Logistics
        self.run_shipment_stage(order.id).await
    }

    // ========================================================================
    // Operator replays
    // ========================================================================

    /// Re-run the shipment stage and, on success, the pickup stage.
    ///
    /// A shipment the carrier already accepted but the ledger never stored is
    /// recorded from its AWB instead of being requested again.
    pub async fn replay_shipment(&self, order_id: Uuid) -> Result<FulfillmentReport, OrchestratorError> {
        let order = self.ledger.get(order_id).await?;
        if order.shipment.is_some() {
            return Err(OrchestratorError::InvalidState {
                order_id,
                reason: "shipment already created".into(),
            });
        }
        if order.payment_reference.is_none() {
            return Err(OrchestratorError::InvalidState {
                order_id,
                reason: format!("payment not confirmed (status {})", order.status),
            });
        }

        if let Some((tracking_id, _)) = order.unrecorded_reference(Stage::Shipment) {
            info!("Recording shipment {} already accepted by the carrier for order {}", tracking_id, order_id);
            let request = self.shipment_request(&order);
            let record = ShipmentRecord {
                order_id,
                tracking_id: tracking_id.to_string(),
                carrier_status: RECOVERED_STATUS.to_string(),
                weight_grams: request.weight_grams,
                dimensions: request.dimensions,
                created_at: Utc::now(),
            };
            self.ledger.record_shipment(order_id, Ok(record)).await?;
            return self.run_pickup_stage(order_id).await;
        }

        info!("Operator replay of shipment stage for order {}", order_id);
        self.run_shipment_stage(order_id).await
    }

    /// Re-run the pickup stage. An accepted but unrecorded pickup is recorded
    /// from its id.
    pub async fn replay_pickup(&self, order_id: Uuid) -> Result<FulfillmentReport, OrchestratorError> {
        let order = self.ledger.get(order_id).await?;
        if order.pickup.is_some() {
            return Err(OrchestratorError::InvalidState {
                order_id,
                reason: "pickup already scheduled".into(),
            });
        }
        let Some(tracking_id) = order.tracking_id().map(str::to_string) else {
            return Err(OrchestratorError::InvalidState {
                order_id,
                reason: "no shipment to collect".into(),
            });
        };

        if let Some((pickup_id, noted_at)) = order.unrecorded_reference(Stage::Pickup) {
            info!("Recording pickup {} already accepted by the carrier for order {}", pickup_id, order_id);
            let record = PickupRecord {
                order_id,
                tracking_ids: vec![tracking_id.clone()],
                pickup_id: pickup_id.to_string(),
                scheduled_date: noted_at.date_naive() + Duration::days(i64::from(self.settings.pickup_lead_days)),
                window: pickup_window(),
                created_at: Utc::now(),
            };
            let pickup_id = record.pickup_id.clone();
            self.ledger.record_pickup(order_id, Ok(record)).await?;
            return Ok(self.complete(order_id, tracking_id, pickup_id).await);
        }

        info!("Operator replay of pickup stage for order {}", order_id);
        self.run_pickup_stage(order_id).await
    }

    pub async fn report(&self, order_id: Uuid) -> Result<FulfillmentReport, OrchestratorError> {
        let order = self.ledger.get(order_id).await?;
        Ok(FulfillmentReport::from(&order))
    }

    // ========================================================================
    // Stages
    // ========================================================================

    fn shipment_request(&self, order: &Order) -> ShipmentRequest {
        let parcel = &self.settings.parcel;
        ShipmentRequest {
            order_id: order.id,
            address: order.address.clone(),
            weight_grams: parcel.grams_per_item * f64::from(order.total_quantity()),
            dimensions: parcel.dimensions,
            payment_mode: self.settings.payment_mode,
        }
    }

    async fn run_shipment_stage(&self, order_id: Uuid) -> Result<FulfillmentReport, OrchestratorError> {
        let order = self.ledger.get(order_id).await?;
        let request = self.shipment_request(&order);

        match self.shipments.create_shipment(request).await {
            Ok(record) => {
                let tracking_id = record.tracking_id.clone();
                if let Err(e) = self.ledger.record_shipment(order_id, Ok(record)).await {
                    return Ok(self.unrecorded(order_id, Stage::Shipment, &tracking_id, Some(tracking_id.clone()), e).await);
                }
                self.run_pickup_stage(order_id).await
            }
            Err(e) => {
                let detail = e.into_failure();
                warn!("Shipment stage failed for order {}: {}", order_id, detail);
                if let Err(e) = self.ledger.record_shipment(order_id, Err(detail.clone())).await {
                    error!("Shipment failure for order {} was not recorded: {}", order_id, e);
                }
                self.escalate(order_id, Stage::Shipment, &detail, None).await;
                Ok(self.follow_up_report(order_id, None, None).await)
            }
        }
    }

    async fn run_pickup_stage(&self, order_id: Uuid) -> Result<FulfillmentReport, OrchestratorError> {
        let order = self.ledger.get(order_id).await?;
        let Some(tracking_id) = order.tracking_id().map(str::to_string) else {
            return Err(OrchestratorError::InvalidState {
                order_id,
                reason: "pickup requested without a tracking id".into(),
            });
        };

        let pickup_date = Utc::now().date_naive() + Duration::days(i64::from(self.settings.pickup_lead_days));
        let label = product_label(&order.items, &self.settings.product_label_fallback);
        let payment_reference = order.payment_reference.clone().unwrap_or_default();

        let scheduled = self
            .pickups
            .schedule_pickup(order_id, std::slice::from_ref(&tracking_id), pickup_date, &label, &payment_reference)
            .await;

        match scheduled {
            Ok(record) => {
                let pickup_id = record.pickup_id.clone();
                if let Err(e) = self.ledger.record_pickup(order_id, Ok(record)).await {
                    return Ok(self.unrecorded(order_id, Stage::Pickup, &pickup_id, Some(tracking_id), e).await);
                }
                Ok(self.complete(order_id, tracking_id, pickup_id).await)
            }
            Err(e) => {
                let detail = e.into_failure();
                warn!("Pickup stage failed for order {} (AWB {} kept): {}", order_id, tracking_id, detail);
                if let Err(e) = self.ledger.record_pickup(order_id, Err(detail.clone())).await {
                    error!("Pickup failure for order {} was not recorded: {}", order_id, e);
                }
                self.escalate(order_id, Stage::Pickup, &detail, Some(tracking_id.clone())).await;
                Ok(self.follow_up_report(order_id, Some(tracking_id), None).await)
            }
        }
    }

    async fn complete(&self, order_id: Uuid, tracking_id: String, pickup_id: String) -> FulfillmentReport {
        let update = OrderStatusUpdate {
            order_id,
            tracking_id: tracking_id.clone(),
            pickup_id: pickup_id.clone(),
        };
        if let Err(e) = self.notifier.notify(&update).await {
            warn!("Order-status endpoint not updated for order {}: {}", order_id, e);
        }

        if let Err(e) = self.ledger.record_fulfilled(order_id).await {
            return self.unrecorded(order_id, Stage::Completion, &pickup_id, Some(tracking_id), e).await;
        }
        info!("Order {} fulfilled: AWB {}, pickup {}", order_id, tracking_id, pickup_id);

        self.emit(FulfillmentEvent::OrderFulfilled(OrderFulfilledEvent {
            order_id,
            tracking_id,
            pickup_id,
            timestamp: Utc::now().timestamp(),
        }))
        .await;

        match self.report(order_id).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Order {} fulfilled but could not be read back: {}", order_id, e);
                self.follow_up_report(order_id, None, None).await
            }
        }
    }

    /// The carrier accepted a request whose outcome the ledger did not take.
    /// The identifier goes into a failure entry so the order lands in the
    /// manual queue and a replay records it instead of calling the carrier again.
    async fn unrecorded(
        &self,
        order_id: Uuid,
        stage: Stage,
        reference: &str,
        tracking_id: Option<String>,
        cause: LedgerError,
    ) -> FulfillmentReport {
        error!(
            "{} {} for order {} was accepted by the carrier but not recorded: {}",
            stage, reference, order_id, cause
        );
        let detail = FailureDetail::unrecorded(reference, format!("ledger write failed: {}", cause));

        let noted = match stage {
            Stage::Shipment => Some(self.ledger.record_shipment(order_id, Err(detail.clone())).await),
            Stage::Pickup => Some(self.ledger.record_pickup(order_id, Err(detail.clone())).await),
            _ => None,
        };
        if let Some(Err(e)) = noted {
            error!("Order {} needs manual follow-up for {} {}: {}", order_id, stage, reference, e);
        }

        self.escalate(order_id, stage, &detail, tracking_id.clone()).await;
        let pickup_id = (stage != Stage::Shipment).then(|| reference.to_string());
        self.follow_up_report(order_id, tracking_id, pickup_id).await
    }

    /// Shopper-safe report for an order that needs an operator. Identifiers the
    /// carrier issued are kept even when the ledger does not hold them.
    async fn follow_up_report(
        &self,
        order_id: Uuid,
        tracking_id: Option<String>,
        pickup_id: Option<String>,
    ) -> FulfillmentReport {
        let mut report = match self.ledger.get(order_id).await {
            Ok(order) => FulfillmentReport::from(&order),
            Err(e) => {
                warn!("Order {} could not be read back: {}", order_id, e);
                FulfillmentReport {
                    order_id,
                    status: OrderStatus::PaymentConfirmed,
                    tracking_id: None,
                    pickup_id: None,
                    shopper_message: SHOPPER_MESSAGE.to_string(),
                    follow_up_required: true,
                }
            }
        };
        if report.tracking_id.is_none() {
            report.tracking_id = tracking_id;
        }
        if report.pickup_id.is_none() {
            report.pickup_id = pickup_id;
        }
        report.follow_up_required = report.status != OrderStatus::Fulfilled;
        report
    }

    async fn escalate(&self, order_id: Uuid, stage: Stage, detail: &FailureDetail, tracking_id: Option<String>) {
        self.emit(FulfillmentEvent::ManualFulfillmentRequired(ManualFulfillmentRequiredEvent {
            order_id,
            failed_stage: stage.to_string(),
            reason: detail.to_string(),
            tracking_id,
            timestamp: Utc::now().timestamp(),
        }))
        .await;
    }

    async fn emit(&self, event: FulfillmentEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!("Failed to publish {} for order {}: {}", event.kind(), event.order_id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_draft;
    use crate::ledger::InMemoryOrderLedger;
    use crate::mock::{
        MockPaymentGateway, RecordingEventSink, RecordingNotifier, ScriptedPickupCarrier, ScriptedShipmentCarrier,
    };
    use crate::shipment::CarrierSettings;
    use keepsake_core::carrier::ProductCode;
    use keepsake_core::payment::HmacSignatureVerifier;
    use rust_decimal::Decimal;

    const SECRET: &str = "test-key-secret";

    struct Harness {
        orchestrator: FulfillmentOrchestrator,
        gateway: Arc<MockPaymentGateway>,
        shipments: Arc<ScriptedShipmentCarrier>,
        pickups: Arc<ScriptedPickupCarrier>,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(MockPaymentGateway::new());
        let shipments = Arc::new(ScriptedShipmentCarrier::succeeding("AWB123"));
        let pickups = Arc::new(ScriptedPickupCarrier::succeeding("PK1"));
        let settings = CarrierSettings {
            pickup_location_code: "BLR-WH-01".into(),
            product_code: ProductCode::D,
            service_type: "Standard".into(),
            use_mock: false,
        };
        let orchestrator = FulfillmentOrchestrator::new(
            Collaborators {
                ledger: Arc::new(InMemoryOrderLedger::new()),
                payments: PaymentIntentService::new(gateway.clone(), "INR"),
                shipments: ShipmentService::new(shipments.clone(), settings),
                pickups: PickupService::new(pickups.clone(), "BLR-WH-01", false),
                verifier: Arc::new(HmacSignatureVerifier::new(SECRET)),
                notifier: Arc::new(RecordingNotifier::new()),
                events: Arc::new(RecordingEventSink::new()),
            },
            FulfillmentSettings::default(),
        );
        Harness { orchestrator, gateway, shipments, pickups }
    }

    fn signed(gateway_order_id: &str, payment_id: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            gateway_payment_id: payment_id.into(),
            gateway_order_id: gateway_order_id.into(),
            signature: HmacSignatureVerifier::new(SECRET)
                .sign(gateway_order_id, payment_id)
                .unwrap(),
        }
    }

    #[test]
    fn test_product_label() {
        let draft = sample_draft();
        assert_eq!(product_label(&draft.items, "Gift"), "Engraved Photo Frame +1 more");
        assert_eq!(product_label(&draft.items[..1], "Gift"), "Engraved Photo Frame");
        assert_eq!(product_label(&[], "Gift"), "Gift");
    }

    #[tokio::test]
    async fn test_unsupported_currency_is_invalid_input() {
        let h = harness();
        let mut draft = sample_draft();
        draft.currency = Some("USD".into());

        let err = h.orchestrator.begin_checkout(&draft).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidInput(DraftError::UnsupportedCurrency(_))));
        assert_eq!(h.gateway.calls(), 0);
        assert!(h.orchestrator.ledger().list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_marks_payment_failed() {
        let gateway = Arc::new(MockPaymentGateway::failing("gateway down"));
        let h = harness();
        let orchestrator = FulfillmentOrchestrator {
            payments: PaymentIntentService::new(gateway, "INR"),
            ..h.orchestrator
        };

        let err = orchestrator.begin_checkout(&sample_draft()).await.unwrap_err();
        assert!(matches!(&err, OrchestratorError::PaymentIntent(e) if e.is_retryable()));

        let failed = orchestrator.ledger().list_by_status(OrderStatus::PaymentFailed).await.unwrap();
        assert_eq!(failed.len(), 1);
        let failure = failed[0].last_failure.as_ref().unwrap();
        assert_eq!(failure.kind, keepsake_core::FailureKind::GatewayRejected);
    }

    #[tokio::test]
    async fn test_weight_scales_with_quantity() {
        let h = harness();
        let session = h.orchestrator.begin_checkout(&sample_draft()).await.unwrap();
        h.orchestrator
            .confirm_payment(&signed(&session.gateway_order_id, "pay_1"))
            .await
            .unwrap();

        let sent = h.shipments.last_request().await.unwrap();
        // 3 items at 250 g
        assert_eq!(sent.weight, 750.0);
        assert_eq!(sent.length, 20.0);

        let batch = h.pickups.last_batch().await;
        assert_eq!(batch[0].product_label, "Engraved Photo Frame +1 more");
        assert_eq!(batch[0].payment_reference, "pay_1");
        assert_eq!(
            batch[0].pickup_date,
            (Utc::now().date_naive() + Duration::days(1)).format("%Y-%m-%d").to_string()
        );
    }

    #[tokio::test]
    async fn test_duplicate_confirmation_makes_no_carrier_call() {
        let h = harness();
        let session = h.orchestrator.begin_checkout(&sample_draft()).await.unwrap();
        let confirmation = signed(&session.gateway_order_id, "pay_1");

        let first = h.orchestrator.confirm_payment(&confirmation).await.unwrap();
        let second = h.orchestrator.confirm_payment(&confirmation).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.shipments.calls(), 1);
        assert_eq!(h.pickups.calls(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_with_other_payment_id_conflicts() {
        let h = harness();
        let session = h.orchestrator.begin_checkout(&sample_draft()).await.unwrap();
        h.orchestrator
            .confirm_payment(&signed(&session.gateway_order_id, "pay_1"))
            .await
            .unwrap();

        let err = h
            .orchestrator
            .confirm_payment(&signed(&session.gateway_order_id, "pay_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Ledger(LedgerError::Conflict(_))));
        assert_eq!(h.shipments.calls(), 1);
    }

    #[tokio::test]
    async fn test_replay_of_completed_stage_is_refused() {
        let h = harness();
        let session = h.orchestrator.begin_checkout(&sample_draft()).await.unwrap();
        h.orchestrator
            .confirm_payment(&signed(&session.gateway_order_id, "pay_1"))
            .await
            .unwrap();

        let shipment = h.orchestrator.replay_shipment(session.order_id).await;
        let pickup = h.orchestrator.replay_pickup(session.order_id).await;
        assert!(matches!(shipment, Err(OrchestratorError::InvalidState { .. })));
        assert!(matches!(pickup, Err(OrchestratorError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_replay_before_payment_is_refused() {
        let h = harness();
        let session = h.orchestrator.begin_checkout(&sample_draft()).await.unwrap();

        let result = h.orchestrator.replay_shipment(session.order_id).await;
        assert!(matches!(result, Err(OrchestratorError::InvalidState { .. })));
        assert_eq!(h.shipments.calls(), 0);
    }

    #[tokio::test]
    async fn test_draft_total_check_precedes_ledger() {
        let h = harness();
        let mut draft = sample_draft();
        draft.total = Decimal::from(-10);

        let err = h.orchestrator.begin_checkout(&draft).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidInput(DraftError::InvalidAmount(_))));
        assert!(h.orchestrator.ledger().list_all().await.unwrap().is_empty());
    }
}
