use async_trait::async_trait;
use keepsake_core::status::{NotifyError, OrderStatusNotifier, OrderStatusUpdate};
use reqwest::Client;
use std::time::Duration;

use crate::http::{client_with_timeout, transport_error};

/// Posts tracking and pickup ids to the storefront's order-status endpoint
pub struct HttpOrderStatusNotifier {
    http: Client,
    url: String,
}

impl HttpOrderStatusNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: client_with_timeout(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl OrderStatusNotifier for HttpOrderStatusNotifier {
    async fn notify(&self, update: &OrderStatusUpdate) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.url)
            .json(update)
            .send()
            .await
            .map_err(|e| transport_error("order-status endpoint", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::NotAcknowledged(status.as_u16()));
        }
        Ok(())
    }
}
