use keepsake_order::{FulfillmentOrchestrator, OrderLedger};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FulfillmentOrchestrator>,
    pub ledger: Arc<dyn OrderLedger>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(orchestrator: FulfillmentOrchestrator, auth: AuthConfig) -> Self {
        let ledger = orchestrator.ledger();
        Self {
            orchestrator: Arc::new(orchestrator),
            ledger,
            auth,
        }
    }
}
