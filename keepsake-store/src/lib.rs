pub mod app_config;
pub mod carrier_client;
pub mod database;
pub mod events;
pub mod gateway;
pub mod http;
pub mod order_repo;
pub mod status_client;

pub use app_config::Config;
pub use carrier_client::HttpCarrierClient;
pub use database::DbClient;
pub use gateway::HttpPaymentGateway;
pub use order_repo::PgOrderLedger;
pub use status_client::HttpOrderStatusNotifier;

#[cfg(feature = "kafka")]
pub use events::EventProducer;
