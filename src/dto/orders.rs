use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem, Payment, PaymentMethod};

/// Where the shipping snapshot comes from, resolved exactly once before the
/// order row is written.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ShippingSource {
    SavedAddress {
        address_id: Uuid,
    },
    Inline {
        full_name: String,
        phone: String,
        address_line: String,
        city: String,
        province: String,
        postal_code: String,
    },
    None,
}

impl Default for ShippingSource {
    fn default() -> Self {
        Self::None
    }
}

/// Result of a client-side card confirmation against the payment processor.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CardConfirmation {
    pub transaction_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub shipping: ShippingSource,
    pub card_confirmation: Option<CardConfirmation>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipping_source_deserializes_tagged_variants() {
        let saved: ShippingSource = serde_json::from_value(serde_json::json!({
            "source": "saved_address",
            "address_id": "0b2ef0b9-6e3c-4f6a-a9ab-52b8d7a6b7de"
        }))
        .unwrap();
        assert!(matches!(saved, ShippingSource::SavedAddress { .. }));

        let inline: ShippingSource = serde_json::from_value(serde_json::json!({
            "source": "inline",
            "full_name": "A",
            "phone": "1",
            "address_line": "x",
            "city": "y",
            "province": "z",
            "postal_code": "0"
        }))
        .unwrap();
        assert!(matches!(inline, ShippingSource::Inline { .. }));

        let none: ShippingSource =
            serde_json::from_value(serde_json::json!({ "source": "none" })).unwrap();
        assert!(matches!(none, ShippingSource::None));
    }

    #[test]
    fn checkout_request_defaults_to_no_shipping() {
        let req: CheckoutRequest =
            serde_json::from_value(serde_json::json!({ "payment_method": "cod" })).unwrap();
        assert!(matches!(req.shipping, ShippingSource::None));
        assert!(req.card_confirmation.is_none());
    }
}
