use chrono::{NaiveDate, Utc};
use keepsake_core::carrier::{CarrierPickupRequest, CarrierReply, PickupCarrier, PickupResponseBody, ShipmentIdentifier};
use keepsake_core::FailureDetail;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::{PickupRecord, PickupWindow};

/// Collection window agreed with the carrier; not configurable per order.
pub const PICKUP_START_TIME: &str = "10:00:00";
pub const PICKUP_END_TIME: &str = "18:00:00";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PickupError {
    #[error("Invalid pickup request: {0}")]
    InvalidRequest(String),

    #[error("Pickup scheduling failed: {0}")]
    SchedulingFailed(FailureDetail),
}

impl PickupError {
    pub fn into_failure(self) -> FailureDetail {
        match self {
            PickupError::InvalidRequest(reason) => FailureDetail::invalid_input(reason),
            PickupError::SchedulingFailed(detail) => detail,
        }
    }
}

pub fn pickup_window() -> PickupWindow {
    PickupWindow {
        start: PICKUP_START_TIME.to_string(),
        end: PICKUP_END_TIME.to_string(),
    }
}

pub fn interpret_pickup_reply(reply: &CarrierReply) -> Result<String, FailureDetail> {
    let body: PickupResponseBody = match serde_json::from_str(&reply.body) {
        Ok(body) => body,
        Err(e) => {
            return Err(FailureDetail::transport(format!("unparseable pickup response: {}", e))
                .with_raw(reply.status, &reply.body));
        }
    };

    if !body.success {
        let reason = body.reason.unwrap_or_else(|| "carrier declined pickup".to_string());
        return Err(FailureDetail::business(reason).with_raw(reply.status, &reply.body));
    }

    if !(200..300).contains(&reply.status) {
        return Err(FailureDetail::transport(format!("carrier answered HTTP {}", reply.status))
            .with_raw(reply.status, &reply.body));
    }

    match body.pickup {
        Some(pickup) if !pickup.pickup_id.trim().is_empty() => Ok(pickup.pickup_id),
        _ => Err(FailureDetail::transport("pickup response carried no pickup id")
            .with_raw(reply.status, &reply.body)),
    }
}

pub struct PickupService {
    carrier: Arc<dyn PickupCarrier>,
    pickup_location: String,
    use_mock: bool,
}

impl PickupService {
    pub fn new(carrier: Arc<dyn PickupCarrier>, pickup_location: impl Into<String>, use_mock: bool) -> Self {
        Self {
            carrier,
            pickup_location: pickup_location.into(),
            use_mock,
        }
    }

    /// Book a carrier collection for already-created shipments.
    /// A failure here leaves the shipments untouched.
    pub async fn schedule_pickup(
        &self,
        order_id: Uuid,
        tracking_ids: &[String],
        pickup_date: NaiveDate,
        product_label: &str,
        payment_reference: &str,
    ) -> Result<PickupRecord, PickupError> {
        if tracking_ids.is_empty() || tracking_ids.iter().any(|t| t.trim().is_empty()) {
            return Err(PickupError::InvalidRequest("at least one tracking id is required".into()));
        }

        let today = Utc::now().date_naive();
        if pickup_date < today {
            return Err(PickupError::InvalidRequest(format!(
                "pickup date {} is in the past",
                pickup_date
            )));
        }

        let pickup_id = if self.use_mock {
            let simple = order_id.simple().to_string();
            format!("MOCK-PK-{}", simple.get(..8).unwrap_or(&simple).to_uppercase())
        } else {
            let requests: Vec<CarrierPickupRequest> = tracking_ids
                .iter()
                .map(|awb| CarrierPickupRequest {
                    pickup_location: self.pickup_location.clone(),
                    pickup_date: pickup_date.format("%Y-%m-%d").to_string(),
                    pickup_start_time: PICKUP_START_TIME.to_string(),
                    pickup_end_time: PICKUP_END_TIME.to_string(),
                    shipment_identifiers: vec![ShipmentIdentifier { awb: awb.clone() }],
                    product_label: product_label.to_string(),
                    payment_reference: payment_reference.to_string(),
                })
                .collect();

            let reply = self
                .carrier
                .create_pickups(&requests)
                .await
                .map_err(|e| PickupError::SchedulingFailed(e.into()))?;
            interpret_pickup_reply(&reply).map_err(PickupError::SchedulingFailed)?
        };

        info!(
            "Pickup {} booked for order {} on {} ({} shipment(s))",
            pickup_id,
            order_id,
            pickup_date,
            tracking_ids.len()
        );

        Ok(PickupRecord {
            order_id,
            tracking_ids: tracking_ids.to_vec(),
            pickup_id,
            scheduled_date: pickup_date,
            window: pickup_window(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedPickupCarrier;
    use chrono::Duration;
    use keepsake_core::{FailureKind, TransportError};

    fn tomorrow() -> NaiveDate {
        Utc::now().date_naive() + Duration::days(1)
    }

    #[tokio::test]
    async fn test_one_request_per_tracking_id() {
        let carrier = Arc::new(ScriptedPickupCarrier::succeeding("PK1"));
        let service = PickupService::new(carrier.clone(), "BLR-WH-01", false);
        let awbs = vec!["AWB1".to_string(), "AWB2".to_string()];

        let record = service
            .schedule_pickup(Uuid::new_v4(), &awbs, tomorrow(), "Engraved Photo Frame", "pay_1")
            .await
            .unwrap();
        assert_eq!(record.pickup_id, "PK1");
        assert_eq!(record.tracking_ids, awbs);

        let sent = carrier.last_batch().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|r| r.pickup_start_time == PICKUP_START_TIME && r.pickup_end_time == PICKUP_END_TIME));
        assert_eq!(sent[1].shipment_identifiers[0].awb, "AWB2");
        assert_eq!(sent[0].payment_reference, "pay_1");
    }

    #[tokio::test]
    async fn test_empty_tracking_ids_rejected() {
        let carrier = Arc::new(ScriptedPickupCarrier::succeeding("PK1"));
        let service = PickupService::new(carrier.clone(), "BLR-WH-01", false);

        let result = service.schedule_pickup(Uuid::new_v4(), &[], tomorrow(), "x", "pay_1").await;
        assert!(matches!(result, Err(PickupError::InvalidRequest(_))));
        assert_eq!(carrier.calls(), 0);
    }

    #[tokio::test]
    async fn test_past_date_rejected() {
        let carrier = Arc::new(ScriptedPickupCarrier::succeeding("PK1"));
        let service = PickupService::new(carrier.clone(), "BLR-WH-01", false);
        let yesterday = Utc::now().date_naive() - Duration::days(1);

        let result = service
            .schedule_pickup(Uuid::new_v4(), &["AWB1".to_string()], yesterday, "x", "pay_1")
            .await;
        assert!(matches!(result, Err(PickupError::InvalidRequest(_))));
        assert_eq!(carrier.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_scheduling_failure() {
        let carrier = Arc::new(ScriptedPickupCarrier::failing(TransportError::Timeout("pickup api".into())));
        let service = PickupService::new(carrier, "BLR-WH-01", false);

        let err = service
            .schedule_pickup(Uuid::new_v4(), &["AWB1".to_string()], tomorrow(), "x", "pay_1")
            .await
            .unwrap_err();
        assert_eq!(err.into_failure().kind, FailureKind::Transport);
    }

    #[tokio::test]
    async fn test_mock_mode_books_locally() {
        let carrier = Arc::new(ScriptedPickupCarrier::succeeding("PK1"));
        let service = PickupService::new(carrier.clone(), "BLR-WH-01", true);
        let order_id = Uuid::new_v4();

        let record = service
            .schedule_pickup(order_id, &["MOCK-AWB-1".to_string()], tomorrow(), "x", "pay_1")
            .await
            .unwrap();
        assert!(record.pickup_id.starts_with("MOCK-PK-"));
        assert_eq!(record.window, pickup_window());
        assert_eq!(carrier.calls(), 0);
    }

    #[test]
    fn test_declined_pickup_is_business_failure() {
        let reply = CarrierReply::new(200, r#"{"success":false,"reason":"slot_unavailable"}"#);
        let detail = interpret_pickup_reply(&reply).unwrap_err();
        assert_eq!(detail.kind, FailureKind::CarrierBusiness);
        assert_eq!(detail.reason, "slot_unavailable");
    }
}
