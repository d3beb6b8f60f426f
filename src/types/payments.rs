//! Payment related records

use serde::{Deserialize, Serialize};

use super::user::User;
use super::{identity_eq, telegram_object, Extra};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPrice {
    pub label: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    pub start_parameter: String,
    pub currency: String,
    pub total_amount: i64,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub country_code: String,
    pub state: String,
    pub city: String,
    pub street_line1: String,
    pub street_line2: String,
    pub post_code: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// An incoming shipping query for an invoice with a flexible price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingQuery {
    pub id: String,
    pub from: User,
    pub invoice_payload: String,
    pub shipping_address: ShippingAddress,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreCheckoutQuery {
    pub id: String,
    pub from: User,
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_option_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_info: Option<OrderInfo>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessfulPayment {
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
    pub telegram_payment_charge_id: String,
    pub provider_payment_charge_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_option_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_info: Option<OrderInfo>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One shipping option offered in an answer to a shipping query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingOption {
    pub id: String,
    pub title: String,
    pub prices: Vec<LabeledPrice>,
}

identity_eq!(ShippingQuery => |q| q.id.clone());
identity_eq!(PreCheckoutQuery => |q| q.id.clone());

telegram_object!(
    LabeledPrice,
    Invoice,
    ShippingAddress,
    OrderInfo,
    ShippingQuery,
    PreCheckoutQuery,
    SuccessfulPayment,
    ShippingOption,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelegramObject;
    use serde_json::json;

    #[test]
    fn test_shipping_query_round_trip() {
        let payload = json!({
            "id": "sq1",
            "from": {"id": 5, "is_bot": false, "first_name": "Lin"},
            "invoice_payload": "premium-month",
            "shipping_address": {
                "country_code": "CN", "state": "SH", "city": "Shanghai",
                "street_line1": "Road 1", "street_line2": "", "post_code": "200000"
            }
        });
        let query = ShippingQuery::de_json(payload.clone()).unwrap();
        assert_eq!(query.shipping_address.city, "Shanghai");
        assert_eq!(query.to_dict(), payload);
    }
}
