use keepsake_core::carrier::{PaymentMode, ProductCode};
use keepsake_order::models::Dimensions;
use keepsake_order::{CarrierSettings, FulfillmentSettings, ParcelSpec};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    pub carrier: CarrierConfig,
    pub parcel: ParcelConfig,
    pub pickup: PickupConfig,
    pub status_endpoint: StatusEndpointConfig,
    pub kafka: Option<KafkaConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Keep the ledger in process memory instead of Postgres (local runs)
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub api_base_url: String,
    pub key_id: String,
    pub key_secret: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CarrierConfig {
    pub base_url: String,
    pub api_token: String,
    pub pickup_location_code: String,
    #[serde(default = "default_product_code")]
    pub product_code: String,
    pub service_type: String,
    #[serde(default = "default_payment_mode")]
    pub payment_mode: String,
    #[serde(default)]
    pub use_mock: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParcelConfig {
    pub grams_per_item: f64,
    pub length_cm: f64,
    pub width_cm: f64,
    pub height_cm: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PickupConfig {
    pub lead_days: u32,
    pub product_label_fallback: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatusEndpointConfig {
    /// Unset disables the post-pickup notification
    pub url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
}

fn default_currency() -> String { "INR".to_string() }
fn default_product_code() -> String { "D".to_string() }
fn default_payment_mode() -> String { "Prepaid".to_string() }
fn default_timeout_ms() -> u64 { 10_000 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // KEEPSAKE__PAYMENT__KEY_SECRET=... overrides payment.key_secret
            .add_source(config::Environment::with_prefix("KEEPSAKE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn carrier_settings(&self) -> Result<CarrierSettings, config::ConfigError> {
        let product_code = match self.carrier.product_code.as_str() {
            "D" => ProductCode::D,
            "C" => ProductCode::C,
            other => {
                return Err(config::ConfigError::Message(format!(
                    "carrier.product_code must be D or C, got {}",
                    other
                )))
            }
        };

        Ok(CarrierSettings {
            pickup_location_code: self.carrier.pickup_location_code.clone(),
            product_code,
            service_type: self.carrier.service_type.clone(),
            use_mock: self.carrier.use_mock,
        })
    }

    pub fn fulfillment_settings(&self) -> Result<FulfillmentSettings, config::ConfigError> {
        let payment_mode = match self.carrier.payment_mode.to_ascii_uppercase().as_str() {
            "PREPAID" => PaymentMode::Prepaid,
            "COD" => PaymentMode::Cod,
            other => {
                return Err(config::ConfigError::Message(format!(
                    "carrier.payment_mode must be Prepaid or COD, got {}",
                    other
                )))
            }
        };

        Ok(FulfillmentSettings {
            currency: self.payment.currency.to_ascii_uppercase(),
            parcel: ParcelSpec {
                grams_per_item: self.parcel.grams_per_item,
                dimensions: Dimensions {
                    length_cm: self.parcel.length_cm,
                    width_cm: self.parcel.width_cm,
                    height_cm: self.parcel.height_cm,
                },
            },
            pickup_lead_days: self.pickup.lead_days,
            payment_mode,
            product_label_fallback: self.pickup.product_label_fallback.clone(),
        })
    }
}

impl PaymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CarrierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl StatusEndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
