use chrono::{DateTime, NaiveDate, Utc};
use keepsake_core::{FailureDetail, FailureKind};
use keepsake_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{DraftError, LedgerError};

/// A cart line captured at checkout time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftItem {
    pub product_ref: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price_at_selection: Decimal,
    /// Engraving / message text chosen by the shopper
    #[serde(default)]
    pub personalization: Option<String>,
}

impl DraftItem {
    /// `None` when the line does not fit in a `Decimal`
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price_at_selection.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShippingAddress {
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub phone: Masked<String>,
    pub email: Masked<String>,
}

/// Amounts computed once by the client and never recomputed mid-flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Client-held order draft handed over when the shopper starts payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDraft {
    pub items: Vec<DraftItem>,
    pub shipping_address: ShippingAddress,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

impl OrderDraft {
    /// Check the draft and return its totals.
    ///
    /// `total == subtotal + shipping_fee + tax` must hold exactly, and the
    /// subtotal must match the captured line prices.
    pub fn validate(&self) -> Result<Totals, DraftError> {
        if self.total <= Decimal::ZERO {
            return Err(DraftError::InvalidAmount(self.total));
        }

        if self.items.is_empty() {
            return Err(DraftError::NoItems);
        }

        for (index, item) in self.items.iter().enumerate() {
            if item.product_ref.trim().is_empty() {
                return Err(DraftError::InvalidItem { index, reason: "missing product reference".into() });
            }
            if item.quantity == 0 {
                return Err(DraftError::InvalidItem { index, reason: "quantity must be at least 1".into() });
            }
            if item.unit_price_at_selection < Decimal::ZERO {
                return Err(DraftError::InvalidItem { index, reason: "negative unit price".into() });
            }
        }

        for (field, value) in [
            ("subtotal", self.subtotal),
            ("shipping_fee", self.shipping_fee),
            ("tax", self.tax),
        ] {
            if value < Decimal::ZERO {
                return Err(DraftError::NegativeAmount(field));
            }
        }

        self.items
            .iter()
            .try_fold(0u32, |acc, item| acc.checked_add(item.quantity))
            .ok_or(DraftError::QuantityOverflow)?;

        let lines = self
            .items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.line_total()?))
            .ok_or(DraftError::InvalidAmount(self.subtotal))?;
        if lines != self.subtotal {
            return Err(DraftError::SubtotalMismatch { expected: lines, actual: self.subtotal });
        }

        let expected = self
            .subtotal
            .checked_add(self.shipping_fee)
            .and_then(|sum| sum.checked_add(self.tax))
            .ok_or(DraftError::InvalidAmount(self.total))?;
        if expected != self.total {
            return Err(DraftError::TotalMismatch { expected, actual: self.total });
        }

        Ok(Totals {
            subtotal: self.subtotal,
            shipping_fee: self.shipping_fee,
            tax: self.tax,
            total: self.total,
        })
    }

    pub fn total_quantity(&self) -> u32 {
        total_quantity(&self.items)
    }
}

fn total_quantity(items: &[DraftItem]) -> u32 {
    items.iter().fold(0u32, |acc, item| acc.saturating_add(item.quantity))
}

/// Overall lifecycle, projected from the recorded stage outcomes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    AwaitingPaymentConfirmation,
    PaymentConfirmed,
    ShipmentCreated,
    PickupScheduled,
    Fulfilled,
    PaymentFailed,
    ManualFulfillmentRequired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::AwaitingPaymentConfirmation => "AWAITING_PAYMENT_CONFIRMATION",
            OrderStatus::PaymentConfirmed => "PAYMENT_CONFIRMED",
            OrderStatus::ShipmentCreated => "SHIPMENT_CREATED",
            OrderStatus::PickupScheduled => "PICKUP_SCHEDULED",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::ManualFulfillmentRequired => "MANUAL_FULFILLMENT_REQUIRED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.to_ascii_uppercase().as_str() {
            "PENDING_PAYMENT" => OrderStatus::PendingPayment,
            "AWAITING_PAYMENT_CONFIRMATION" => OrderStatus::AwaitingPaymentConfirmation,
            "PAYMENT_CONFIRMED" => OrderStatus::PaymentConfirmed,
            "SHIPMENT_CREATED" => OrderStatus::ShipmentCreated,
            "PICKUP_SCHEDULED" => OrderStatus::PickupScheduled,
            "FULFILLED" => OrderStatus::Fulfilled,
            "PAYMENT_FAILED" => OrderStatus::PaymentFailed,
            "MANUAL_FULFILLMENT_REQUIRED" => OrderStatus::ManualFulfillmentRequired,
            other => return Err(format!("unknown order status: {}", other)),
        };
        Ok(status)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    NotRequested,
    Created,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickupStatus {
    NotRequested,
    Scheduled,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub length_cm: f64,
    pub width_cm: f64,
    pub height_cm: f64,
}

/// Carrier-side shipment. Once it has a tracking id it exists physically
/// and cannot be un-created from here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipmentRecord {
    pub order_id: Uuid,
    pub tracking_id: String,
    pub carrier_status: String,
    pub weight_grams: f64,
    pub dimensions: Dimensions,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickupWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PickupRecord {
    pub order_id: Uuid,
    pub tracking_ids: Vec<String>,
    pub pickup_id: String,
    pub scheduled_date: NaiveDate,
    pub window: PickupWindow,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    PaymentIntent,
    PaymentConfirmation,
    Shipment,
    Pickup,
    Completion,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::PaymentIntent => "PAYMENT_INTENT",
            Stage::PaymentConfirmation => "PAYMENT_CONFIRMATION",
            Stage::Shipment => "SHIPMENT",
            Stage::Pickup => "PICKUP",
            Stage::Completion => "COMPLETION",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageOutcome {
    IntentCreated { gateway_order_id: String },
    Confirmed { payment_reference: String },
    Rejected { reason: String },
    ShipmentCreated { tracking_id: String },
    PickupScheduled { pickup_id: String },
    Completed,
    Failed { detail: FailureDetail },
}

/// One append-only history line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageEntry {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied,
    /// Same stage replayed with the same outcome; nothing was written.
    Unchanged,
}

pub type StageResult<T> = Result<T, FailureDetail>;

/// A write the orchestrator asks the ledger to persist
#[derive(Debug, Clone, PartialEq)]
pub enum StageMutation {
    PaymentIntent { gateway_order_id: String },
    PaymentConfirmed { payment_reference: String },
    PaymentFailed(FailureDetail),
    ConfirmationRejected { reason: String },
    Shipment(StageResult<ShipmentRecord>),
    Pickup(StageResult<PickupRecord>),
    Fulfilled,
}

impl StageMutation {
    pub fn stage(&self) -> Stage {
        match self {
            StageMutation::PaymentIntent { .. } => Stage::PaymentIntent,
            StageMutation::PaymentConfirmed { .. }
            | StageMutation::PaymentFailed(_)
            | StageMutation::ConfirmationRejected { .. } => Stage::PaymentConfirmation,
            StageMutation::Shipment(_) => Stage::Shipment,
            StageMutation::Pickup(_) => Stage::Pickup,
            StageMutation::Fulfilled => Stage::Completion,
        }
    }
}

/// The single durable aggregate for a checkout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub items: Vec<DraftItem>,
    pub address: ShippingAddress,
    pub totals: Totals,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipment_status: ShipmentStatus,
    pub pickup_status: PickupStatus,
    pub gateway_order_id: Option<String>,
    pub payment_reference: Option<String>,
    pub shipment: Option<ShipmentRecord>,
    pub pickup: Option<PickupRecord>,
    pub last_failure: Option<FailureDetail>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub history: Vec<StageEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Open a ledger entry for a validated draft
    pub fn open(draft: &OrderDraft) -> Result<Self, DraftError> {
        let totals = draft.validate()?;
        let currency = draft.currency.clone().ok_or(DraftError::MissingCurrency)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            items: draft.items.clone(),
            address: draft.shipping_address.clone(),
            totals,
            currency,
            status: OrderStatus::PendingPayment,
            payment_status: PaymentStatus::Pending,
            shipment_status: ShipmentStatus::NotRequested,
            pickup_status: PickupStatus::NotRequested,
            gateway_order_id: None,
            payment_reference: None,
            shipment: None,
            pickup: None,
            last_failure: None,
            fulfilled_at: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.shipment.as_ref().map(|s| s.tracking_id.as_str())
    }

    pub fn pickup_id(&self) -> Option<&str> {
        self.pickup.as_ref().map(|p| p.pickup_id.as_str())
    }

    pub fn total_quantity(&self) -> u32 {
        total_quantity(&self.items)
    }

    /// Most recent history entry for a stage
    pub fn latest(&self, stage: Stage) -> Option<&StageOutcome> {
        self.history
            .iter()
            .rev()
            .find(|entry| entry.stage == stage)
            .map(|entry| &entry.outcome)
    }

    /// Identifier the carrier issued for a stage whose success never reached
    /// the ledger, with the time the gap was recorded.
    pub fn unrecorded_reference(&self, stage: Stage) -> Option<(&str, DateTime<Utc>)> {
        let entry = self.history.iter().rev().find(|entry| entry.stage == stage)?;
        match &entry.outcome {
            StageOutcome::Failed { detail } if detail.kind == FailureKind::Unrecorded => detail
                .remote_reference
                .as_deref()
                .map(|reference| (reference, entry.recorded_at)),
            _ => None,
        }
    }

    /// Persist a stage outcome. Replaying an identical outcome is a no-op.
    pub fn apply(&mut self, mutation: StageMutation) -> Result<RecordOutcome, LedgerError> {
        match mutation {
            StageMutation::PaymentIntent { gateway_order_id } => self.apply_payment_intent(gateway_order_id),
            StageMutation::PaymentConfirmed { payment_reference } => self.apply_payment_confirmed(payment_reference),
            StageMutation::PaymentFailed(detail) => self.apply_payment_failed(detail),
            StageMutation::ConfirmationRejected { reason } => {
                let outcome = StageOutcome::Rejected { reason };
                if self.latest(Stage::PaymentConfirmation) == Some(&outcome) {
                    return Ok(RecordOutcome::Unchanged);
                }
                self.append(Stage::PaymentConfirmation, outcome);
                Ok(RecordOutcome::Applied)
            }
            StageMutation::Shipment(result) => self.apply_shipment(result),
            StageMutation::Pickup(result) => self.apply_pickup(result),
            StageMutation::Fulfilled => self.apply_fulfilled(),
        }
    }

    fn apply_payment_intent(&mut self, gateway_order_id: String) -> Result<RecordOutcome, LedgerError> {
        match self.payment_status {
            PaymentStatus::Pending => {}
            PaymentStatus::AwaitingConfirmation
                if self.gateway_order_id.as_deref() == Some(gateway_order_id.as_str()) =>
            {
                return Ok(RecordOutcome::Unchanged);
            }
            _ => return Err(self.invalid_transition(Stage::PaymentIntent)),
        }

        self.gateway_order_id = Some(gateway_order_id.clone());
        self.payment_status = PaymentStatus::AwaitingConfirmation;
        self.append(Stage::PaymentIntent, StageOutcome::IntentCreated { gateway_order_id });
        Ok(RecordOutcome::Applied)
    }

    fn apply_payment_confirmed(&mut self, payment_reference: String) -> Result<RecordOutcome, LedgerError> {
        match self.payment_status {
            PaymentStatus::AwaitingConfirmation => {}
            PaymentStatus::Confirmed => {
                return if self.payment_reference.as_deref() == Some(payment_reference.as_str()) {
                    Ok(RecordOutcome::Unchanged)
                } else {
                    Err(LedgerError::Conflict(format!(
                        "order {} already confirmed with a different payment reference",
                        self.id
                    )))
                };
            }
            _ => return Err(self.invalid_transition(Stage::PaymentConfirmation)),
        }

        self.payment_reference = Some(payment_reference.clone());
        self.payment_status = PaymentStatus::Confirmed;
        self.append(Stage::PaymentConfirmation, StageOutcome::Confirmed { payment_reference });
        Ok(RecordOutcome::Applied)
    }

    fn apply_payment_failed(&mut self, detail: FailureDetail) -> Result<RecordOutcome, LedgerError> {
        match self.payment_status {
            PaymentStatus::Pending | PaymentStatus::AwaitingConfirmation => {}
            PaymentStatus::Failed if self.last_failure.as_ref() == Some(&detail) => {
                return Ok(RecordOutcome::Unchanged);
            }
            _ => return Err(self.invalid_transition(Stage::PaymentConfirmation)),
        }

        self.payment_status = PaymentStatus::Failed;
        self.last_failure = Some(detail.clone());
        self.append(Stage::PaymentConfirmation, StageOutcome::Failed { detail });
        Ok(RecordOutcome::Applied)
    }

    fn apply_shipment(&mut self, result: StageResult<ShipmentRecord>) -> Result<RecordOutcome, LedgerError> {
        if self.payment_status != PaymentStatus::Confirmed {
            return Err(LedgerError::PreconditionViolated(format!(
                "order {}: shipment requires a confirmed payment",
                self.id
            )));
        }

        match (result, self.shipment.as_ref()) {
            (Ok(record), Some(existing)) => {
                if existing.tracking_id == record.tracking_id {
                    Ok(RecordOutcome::Unchanged)
                } else {
                    Err(LedgerError::Conflict(format!(
                        "order {} already has shipment {}",
                        self.id, existing.tracking_id
                    )))
                }
            }
            (Ok(record), None) => {
                if record.tracking_id.trim().is_empty() {
                    return Err(LedgerError::PreconditionViolated(format!(
                        "order {}: shipment without tracking id",
                        self.id
                    )));
                }
                let tracking_id = record.tracking_id.clone();
                self.shipment = Some(record);
                self.shipment_status = ShipmentStatus::Created;
                self.last_failure = None;
                self.append(Stage::Shipment, StageOutcome::ShipmentCreated { tracking_id });
                Ok(RecordOutcome::Applied)
            }
            (Err(_), Some(existing)) => Err(LedgerError::Conflict(format!(
                "order {} already has shipment {}; refusing to record a failure over it",
                self.id, existing.tracking_id
            ))),
            (Err(detail), None) => {
                let outcome = StageOutcome::Failed { detail: detail.clone() };
                if self.latest(Stage::Shipment) == Some(&outcome) {
                    return Ok(RecordOutcome::Unchanged);
                }
                self.shipment_status = ShipmentStatus::Failed;
                self.last_failure = Some(detail);
                self.append(Stage::Shipment, outcome);
                Ok(RecordOutcome::Applied)
            }
        }
    }

    fn apply_pickup(&mut self, result: StageResult<PickupRecord>) -> Result<RecordOutcome, LedgerError> {
        let has_tracking = self
            .shipment
            .as_ref()
            .is_some_and(|s| !s.tracking_id.trim().is_empty());
        if !has_tracking {
            return Err(LedgerError::PreconditionViolated(format!(
                "order {}: pickup requires a shipment with a tracking id",
                self.id
            )));
        }

        match (result, self.pickup.as_ref()) {
            (Ok(record), Some(existing)) => {
                if existing.pickup_id == record.pickup_id {
                    Ok(RecordOutcome::Unchanged)
                } else {
                    Err(LedgerError::Conflict(format!(
                        "order {} already has pickup {}",
                        self.id, existing.pickup_id
                    )))
                }
            }
            (Ok(record), None) => {
                if record.tracking_ids.is_empty() {
                    return Err(LedgerError::PreconditionViolated(format!(
                        "order {}: pickup without tracking ids",
                        self.id
                    )));
                }
                let pickup_id = record.pickup_id.clone();
                self.pickup = Some(record);
                self.pickup_status = PickupStatus::Scheduled;
                self.last_failure = None;
                self.append(Stage::Pickup, StageOutcome::PickupScheduled { pickup_id });
                Ok(RecordOutcome::Applied)
            }
            (Err(_), Some(existing)) => Err(LedgerError::Conflict(format!(
                "order {} already has pickup {}; refusing to record a failure over it",
                self.id, existing.pickup_id
            ))),
            (Err(detail), None) => {
                let outcome = StageOutcome::Failed { detail: detail.clone() };
                if self.latest(Stage::Pickup) == Some(&outcome) {
                    return Ok(RecordOutcome::Unchanged);
                }
                self.pickup_status = PickupStatus::Failed;
                self.last_failure = Some(detail);
                self.append(Stage::Pickup, outcome);
                Ok(RecordOutcome::Applied)
            }
        }
    }

    fn apply_fulfilled(&mut self) -> Result<RecordOutcome, LedgerError> {
        if self.pickup.is_none() {
            return Err(LedgerError::PreconditionViolated(format!(
                "order {}: completion requires a scheduled pickup",
                self.id
            )));
        }
        if self.fulfilled_at.is_some() {
            return Ok(RecordOutcome::Unchanged);
        }

        let now = Utc::now();
        self.fulfilled_at = Some(now);
        self.append(Stage::Completion, StageOutcome::Completed);
        Ok(RecordOutcome::Applied)
    }

    fn append(&mut self, stage: Stage, outcome: StageOutcome) {
        let now = Utc::now();
        self.history.push(StageEntry { stage, outcome, recorded_at: now });
        self.updated_at = now;
        self.status = self.project_status();
    }

    fn invalid_transition(&self, stage: Stage) -> LedgerError {
        LedgerError::InvalidTransition {
            order_id: self.id,
            stage,
            from: self.status,
        }
    }

    /// Derive the lifecycle status from what has been recorded so far
    pub fn project_status(&self) -> OrderStatus {
        match self.payment_status {
            PaymentStatus::Pending => OrderStatus::PendingPayment,
            PaymentStatus::AwaitingConfirmation => OrderStatus::AwaitingPaymentConfirmation,
            PaymentStatus::Failed => OrderStatus::PaymentFailed,
            PaymentStatus::Confirmed => {
                if self.fulfilled_at.is_some() {
                    OrderStatus::Fulfilled
                } else if self.pickup.is_some() {
                    OrderStatus::PickupScheduled
                } else if self.pickup_status == PickupStatus::Failed
                    || self.shipment_status == ShipmentStatus::Failed
                {
                    OrderStatus::ManualFulfillmentRequired
                } else if self.shipment.is_some() {
                    OrderStatus::ShipmentCreated
                } else {
                    OrderStatus::PaymentConfirmed
                }
            }
        }
    }

    /// Cross-entity invariants; an empty list means the order is consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let expected = self
            .totals
            .subtotal
            .checked_add(self.totals.shipping_fee)
            .and_then(|sum| sum.checked_add(self.totals.tax));
        if expected != Some(self.totals.total) {
            violations.push("total does not equal subtotal + shipping fee + tax".to_string());
        }
        if self.shipment.is_some() && self.payment_status != PaymentStatus::Confirmed {
            violations.push("shipment exists without a confirmed payment".to_string());
        }
        if self.pickup.is_some() && self.tracking_id().map_or(true, |t| t.trim().is_empty()) {
            violations.push("pickup exists without a shipment tracking id".to_string());
        }

        violations
    }
}
