//! Sample drafts shared by unit tests, integration tests and the API tests.

use keepsake_shared::Masked;
use rust_decimal::Decimal;

use crate::models::{DraftItem, OrderDraft, ShippingAddress};

pub fn sample_address() -> ShippingAddress {
    ShippingAddress {
        name: "Asha Rao".to_string(),
        street: "14 Residency Road".to_string(),
        city: "Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        country: "India".to_string(),
        postal_code: "560025".to_string(),
        phone: Masked::from("9845012345"),
        email: Masked::from("asha@example.com"),
    }
}

/// Two personalized items; subtotal 450.00, shipping 50.00, no tax, total 500.00.
pub fn sample_draft() -> OrderDraft {
    OrderDraft {
        items: vec![
            DraftItem {
                product_ref: "frame-engraved-8x10".to_string(),
                title: "Engraved Photo Frame".to_string(),
                quantity: 1,
                unit_price_at_selection: Decimal::new(35000, 2),
                personalization: Some("Happy 10th, A & R".to_string()),
            },
            DraftItem {
                product_ref: "mug-custom-350ml".to_string(),
                title: "Custom Name Mug".to_string(),
                quantity: 2,
                unit_price_at_selection: Decimal::new(5000, 2),
                personalization: Some("Ravi".to_string()),
            },
        ],
        shipping_address: sample_address(),
        subtotal: Decimal::new(45000, 2),
        shipping_fee: Decimal::new(5000, 2),
        tax: Decimal::ZERO,
        total: Decimal::new(50000, 2),
        currency: Some("INR".to_string()),
    }
}
