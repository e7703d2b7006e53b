use keepsake_api::{app, AppState, AuthConfig};
use keepsake_core::events::{FulfillmentEvents, LogEventSink};
use keepsake_core::payment::HmacSignatureVerifier;
use keepsake_core::status::{DisabledStatusNotifier, OrderStatusNotifier};
use keepsake_order::{
    Collaborators, FulfillmentOrchestrator, InMemoryOrderLedger, OrderLedger, PaymentIntentService, PickupService,
    ShipmentService,
};
use keepsake_store::{Config, DbClient, HttpCarrierClient, HttpOrderStatusNotifier, HttpPaymentGateway, PgOrderLedger};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keepsake_api=debug,keepsake_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting Keepsake fulfillment API on port {}", config.server.port);

    // Ledger
    let ledger: Arc<dyn OrderLedger> = if config.database.in_memory {
        tracing::warn!("Using in-memory ledger; orders are lost on restart");
        Arc::new(InMemoryOrderLedger::new())
    } else {
        let db = DbClient::new(&config.database.url)
            .await
            .expect("Failed to connect to Postgres");
        db.migrate().await.expect("Failed to run migrations");
        Arc::new(PgOrderLedger::new(db.pool.clone()))
    };

    // Outbound adapters
    let gateway = Arc::new(
        HttpPaymentGateway::new(
            &config.payment.api_base_url,
            &config.payment.key_id,
            &config.payment.key_secret,
            config.payment.timeout(),
        )
        .expect("Failed to build payment gateway client"),
    );
    let carrier = Arc::new(
        HttpCarrierClient::new(&config.carrier.base_url, &config.carrier.api_token, config.carrier.timeout())
            .expect("Failed to build carrier client"),
    );
    let notifier: Arc<dyn OrderStatusNotifier> = match &config.status_endpoint.url {
        Some(url) => Arc::new(
            HttpOrderStatusNotifier::new(url, config.status_endpoint.timeout())
                .expect("Failed to build order-status client"),
        ),
        None => Arc::new(DisabledStatusNotifier),
    };

    let carrier_settings = config.carrier_settings().expect("Invalid carrier config");
    let settings = config.fulfillment_settings().expect("Invalid fulfillment config");

    let orchestrator = FulfillmentOrchestrator::new(
        Collaborators {
            ledger,
            payments: PaymentIntentService::new(gateway, settings.currency.clone()),
            shipments: ShipmentService::new(carrier.clone(), carrier_settings.clone()),
            pickups: PickupService::new(
                carrier,
                carrier_settings.pickup_location_code.clone(),
                carrier_settings.use_mock,
            ),
            verifier: Arc::new(HmacSignatureVerifier::new(&config.payment.key_secret)),
            notifier,
            events: event_sink(&config),
        },
        settings,
    );

    let app_state = AppState::new(
        orchestrator,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

#[cfg(feature = "kafka")]
fn event_sink(config: &Config) -> Arc<dyn FulfillmentEvents> {
    match &config.kafka {
        Some(kafka) => Arc::new(
            keepsake_store::EventProducer::new(&kafka.brokers, kafka.topic.clone())
                .expect("Failed to create Kafka producer"),
        ),
        None => Arc::new(LogEventSink),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_sink(config: &Config) -> Arc<dyn FulfillmentEvents> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka configured but the binary was built without the kafka feature; logging events instead");
    }
    Arc::new(LogEventSink)
}
