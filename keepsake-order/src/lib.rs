pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;
pub mod ledger;
pub mod mock;
pub mod models;
pub mod orchestrator;
pub mod payment;
pub mod pickup;
pub mod shipment;

pub use error::{DraftError, LedgerError, LedgerResult};
pub use ledger::{InMemoryOrderLedger, InvariantViolation, OrderLedger};
pub use models::{Order, OrderDraft, OrderStatus, RecordOutcome};
pub use orchestrator::{
    CheckoutSession, Collaborators, FulfillmentOrchestrator, FulfillmentReport, FulfillmentSettings,
    OrchestratorError, ParcelSpec,
};
pub use payment::PaymentIntentService;
pub use pickup::PickupService;
pub use shipment::{CarrierSettings, ShipmentService};
