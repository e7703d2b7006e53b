use async_trait::async_trait;
use keepsake_core::carrier::ProductCode;
use keepsake_core::payment::{HmacSignatureVerifier, PaymentConfirmation};
use keepsake_core::FailureKind;
use keepsake_order::fixtures::sample_draft;
use keepsake_order::mock::{
    MockPaymentGateway, RecordingEventSink, RecordingNotifier, ScriptedPickupCarrier, ScriptedShipmentCarrier,
};
use keepsake_order::models::{Stage, StageMutation};
use keepsake_order::{
    CarrierSettings, Collaborators, FulfillmentOrchestrator, FulfillmentSettings, InMemoryOrderLedger, LedgerError,
    LedgerResult, Order, OrderDraft, OrderLedger, OrderStatus, PaymentIntentService, PickupService, RecordOutcome,
    ShipmentService,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const KEY_SECRET: &str = "rzp_test_secret";

/// In-memory ledger whose matching writes fail a set number of times
struct UnreliableLedger {
    inner: InMemoryOrderLedger,
    fails_on: fn(&StageMutation) -> bool,
    failures_left: AtomicUsize,
}

impl UnreliableLedger {
    fn new(fails_on: fn(&StageMutation) -> bool, failures: usize) -> Self {
        Self {
            inner: InMemoryOrderLedger::new(),
            fails_on,
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl OrderLedger for UnreliableLedger {
    async fn create(&self, draft: &OrderDraft) -> LedgerResult<Uuid> {
        self.inner.create(draft).await
    }

    async fn apply(&self, order_id: Uuid, mutation: StageMutation) -> LedgerResult<RecordOutcome> {
        if (self.fails_on)(&mutation) {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(LedgerError::Storage("connection reset by peer".to_string()));
            }
        }
        self.inner.apply(order_id, mutation).await
    }

    async fn get(&self, order_id: Uuid) -> LedgerResult<Order> {
        self.inner.get(order_id).await
    }

    async fn find_by_gateway_order(&self, gateway_order_id: &str) -> LedgerResult<Order> {
        self.inner.find_by_gateway_order(gateway_order_id).await
    }

    async fn list_by_status(&self, status: OrderStatus) -> LedgerResult<Vec<Order>> {
        self.inner.list_by_status(status).await
    }

    async fn list_all(&self) -> LedgerResult<Vec<Order>> {
        self.inner.list_all().await
    }
}

struct Setup {
    orchestrator: FulfillmentOrchestrator,
    ledger: Arc<UnreliableLedger>,
    shipments: Arc<ScriptedShipmentCarrier>,
    pickups: Arc<ScriptedPickupCarrier>,
    events: Arc<RecordingEventSink>,
}

fn setup(ledger: UnreliableLedger) -> Setup {
    let ledger = Arc::new(ledger);
    let shipments = Arc::new(ScriptedShipmentCarrier::succeeding("AWB123"));
    let pickups = Arc::new(ScriptedPickupCarrier::succeeding("PK1"));
    let events = Arc::new(RecordingEventSink::new());

    let carrier = CarrierSettings {
        pickup_location_code: "BLR-WH-01".to_string(),
        product_code: ProductCode::D,
        service_type: "Standard".to_string(),
        use_mock: false,
    };

    let orchestrator = FulfillmentOrchestrator::new(
        Collaborators {
            ledger: ledger.clone(),
            payments: PaymentIntentService::new(Arc::new(MockPaymentGateway::new()), "INR"),
            shipments: ShipmentService::new(shipments.clone(), carrier),
            pickups: PickupService::new(pickups.clone(), "BLR-WH-01", false),
            verifier: Arc::new(HmacSignatureVerifier::new(KEY_SECRET)),
            notifier: Arc::new(RecordingNotifier::new()),
            events: events.clone(),
        },
        FulfillmentSettings::default(),
    );

    Setup { orchestrator, ledger, shipments, pickups, events }
}

fn confirmation(gateway_order_id: &str, payment_id: &str) -> PaymentConfirmation {
    let signature = HmacSignatureVerifier::new(KEY_SECRET)
        .sign(gateway_order_id, payment_id)
        .unwrap();
    PaymentConfirmation {
        gateway_payment_id: payment_id.to_string(),
        gateway_order_id: gateway_order_id.to_string(),
        signature,
    }
}

fn shipment_success(mutation: &StageMutation) -> bool {
    matches!(mutation, StageMutation::Shipment(Ok(_)))
}

fn pickup_success(mutation: &StageMutation) -> bool {
    matches!(mutation, StageMutation::Pickup(Ok(_)))
}

fn any_stage_write(mutation: &StageMutation) -> bool {
    matches!(mutation, StageMutation::Shipment(_) | StageMutation::Pickup(_))
}

fn completion(mutation: &StageMutation) -> bool {
    matches!(mutation, StageMutation::Fulfilled)
}

#[tokio::test]
async fn unrecorded_shipment_keeps_awb_and_lands_in_manual_queue() {
    let s = setup(UnreliableLedger::new(shipment_success, 1));
    let session = s.orchestrator.begin_checkout(&sample_draft()).await.unwrap();

    let report = s
        .orchestrator
        .confirm_payment(&confirmation(&session.gateway_order_id, "pay_101"))
        .await
        .unwrap();

    assert_eq!(report.status, OrderStatus::ManualFulfillmentRequired);
    assert_eq!(report.tracking_id.as_deref(), Some("AWB123"));
    assert_eq!(report.shopper_message, "Order received, processing");
    assert!(report.follow_up_required);
    assert_eq!(s.shipments.calls(), 1);
    assert_eq!(s.pickups.calls(), 0);

    let order = s.ledger.get(session.order_id).await.unwrap();
    let failure = order.last_failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Unrecorded);
    assert_eq!(failure.remote_reference.as_deref(), Some("AWB123"));
    assert_eq!(order.unrecorded_reference(Stage::Shipment).map(|(r, _)| r), Some("AWB123"));

    let manual = s.ledger.list_by_status(OrderStatus::ManualFulfillmentRequired).await.unwrap();
    assert_eq!(manual.len(), 1);
    assert_eq!(
        s.events.kinds().await,
        vec!["payment.confirmed", "order.manual_fulfillment_required"]
    );

    // Replay records the AWB the carrier already issued
    let report = s.orchestrator.replay_shipment(session.order_id).await.unwrap();
    assert_eq!(report.status, OrderStatus::Fulfilled);
    assert_eq!(report.tracking_id.as_deref(), Some("AWB123"));
    assert_eq!(s.shipments.calls(), 1);
    assert_eq!(s.pickups.calls(), 1);
    assert!(s.ledger.audit().await.unwrap().is_empty());
}

#[tokio::test]
async fn unrecorded_pickup_is_recorded_on_replay_without_a_second_booking() {
    let s = setup(UnreliableLedger::new(pickup_success, 1));
    let session = s.orchestrator.begin_checkout(&sample_draft()).await.unwrap();

    let report = s
        .orchestrator
        .confirm_payment(&confirmation(&session.gateway_order_id, "pay_102"))
        .await
        .unwrap();

    assert_eq!(report.status, OrderStatus::ManualFulfillmentRequired);
    assert_eq!(report.tracking_id.as_deref(), Some("AWB123"));
    assert_eq!(report.pickup_id.as_deref(), Some("PK1"));
    assert!(report.follow_up_required);

    let report = s.orchestrator.replay_pickup(session.order_id).await.unwrap();
    assert_eq!(report.status, OrderStatus::Fulfilled);
    assert_eq!(report.pickup_id.as_deref(), Some("PK1"));
    assert_eq!(s.pickups.calls(), 1);

    let order = s.ledger.get(session.order_id).await.unwrap();
    assert_eq!(order.pickup.unwrap().tracking_ids, vec!["AWB123".to_string()]);
}

#[tokio::test]
async fn ledger_outage_after_shipment_still_acknowledges_the_shopper() {
    let s = setup(UnreliableLedger::new(any_stage_write, usize::MAX));
    let session = s.orchestrator.begin_checkout(&sample_draft()).await.unwrap();
    let callback = confirmation(&session.gateway_order_id, "pay_103");

    let report = s.orchestrator.confirm_payment(&callback).await.unwrap();
    assert_eq!(report.status, OrderStatus::PaymentConfirmed);
    assert_eq!(report.tracking_id.as_deref(), Some("AWB123"));
    assert!(report.follow_up_required);

    let events = s.events.events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].kind(), "order.manual_fulfillment_required");

    // Redelivery is flagged and drives no second shipment
    let again = s.orchestrator.confirm_payment(&callback).await.unwrap();
    assert!(again.follow_up_required);
    assert_eq!(s.shipments.calls(), 1);
}

#[tokio::test]
async fn unrecorded_completion_is_flagged_for_follow_up() {
    let s = setup(UnreliableLedger::new(completion, 1));
    let session = s.orchestrator.begin_checkout(&sample_draft()).await.unwrap();

    let report = s
        .orchestrator
        .confirm_payment(&confirmation(&session.gateway_order_id, "pay_104"))
        .await
        .unwrap();

    assert_eq!(report.status, OrderStatus::PickupScheduled);
    assert_eq!(report.pickup_id.as_deref(), Some("PK1"));
    assert!(report.follow_up_required);
    assert_eq!(
        s.events.kinds().await,
        vec!["payment.confirmed", "order.manual_fulfillment_required"]
    );
}
