//! Commerce orders as seen by provisioning and renewal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Line-item metadata key naming the reserved phone number.
pub const ALLOCATED_NUMBER_KEY: &str = "allocated_number";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Placed,
    Draft,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Draft => "draft",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "placed" => Some(OrderStatus::Placed),
            "draft" => Some(OrderStatus::Draft),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(alias = "id")]
    pub order_id: String,
    pub customer_id: String,
    #[serde(default = "default_currency")]
    pub currency_code: String,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

fn default_currency() -> String {
    "inr".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(alias = "id")]
    pub line_item_id: String,
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_quantity() -> i32 {
    1
}

impl LineItem {
    /// Phone number reserved for this item at checkout, if it is a plan item.
    pub fn allocated_number(&self) -> Option<&str> {
        self.metadata
            .get(ALLOCATED_NUMBER_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Input for a renewal draft order.
#[derive(Debug, Clone)]
pub struct DraftOrderRequest {
    pub customer_id: String,
    pub subscription_id: Uuid,
    pub phone_number: String,
    pub amount: Decimal,
    pub currency_code: String,
    pub renewal_date: DateTime<Utc>,
}

impl DraftOrderRequest {
    /// One draft per subscription and renewal date, so a retried renewal
    /// finds the draft it already created.
    pub fn order_id(&self) -> String {
        format!(
            "draft_{}_{}",
            self.subscription_id.simple(),
            self.renewal_date.format("%Y%m%d")
        )
    }

    /// The single-item draft order billing one renewal period.
    pub fn to_order(&self) -> Order {
        let order_id = self.order_id();
        Order {
            items: vec![LineItem {
                line_item_id: order_id.replacen("draft_", "item_", 1),
                product_id: String::new(),
                variant_id: None,
                title: format!("Renewal - {}", self.phone_number),
                quantity: 1,
                unit_price: self.amount,
                metadata: json!({
                    "renewal_for_subscription": self.subscription_id,
                    "renewal_date": self.renewal_date.to_rfc3339(),
                }),
            }],
            order_id,
            customer_id: self.customer_id.clone(),
            currency_code: self.currency_code.clone(),
            status: OrderStatus::Draft,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(metadata: serde_json::Value) -> LineItem {
        LineItem {
            line_item_id: "item_1".to_string(),
            product_id: "prod_1".to_string(),
            variant_id: None,
            title: "Hero 299".to_string(),
            quantity: 1,
            unit_price: Decimal::new(29900, 2),
            metadata,
        }
    }

    #[test]
    fn plan_item_detected_by_allocated_number() {
        let plan = item(json!({ "allocated_number": "+919000000001" }));
        assert_eq!(plan.allocated_number(), Some("+919000000001"));

        assert_eq!(item(json!({})).allocated_number(), None);
        assert_eq!(item(json!(null)).allocated_number(), None);
        assert_eq!(item(json!({ "allocated_number": "" })).allocated_number(), None);
    }

    #[test]
    fn order_accepts_commerce_field_names() {
        let order: Order = serde_json::from_value(json!({
            "id": "order_01",
            "customer_id": "cus_01",
            "items": [{ "id": "item_01", "product_id": "prod_01" }]
        }))
        .unwrap();

        assert_eq!(order.order_id, "order_01");
        assert_eq!(order.currency_code, "inr");
        assert_eq!(order.items[0].line_item_id, "item_01");
        assert_eq!(order.items[0].quantity, 1);
    }

    #[test]
    fn draft_order_bills_one_renewal() {
        let subscription_id = Uuid::new_v4();
        let order = DraftOrderRequest {
            customer_id: "cus_01".to_string(),
            subscription_id,
            phone_number: "+919111111111".to_string(),
            amount: Decimal::new(29900, 2),
            currency_code: "inr".to_string(),
            renewal_date: chrono::Utc::now(),
        }
        .to_order();

        assert!(order.order_id.starts_with("draft_"));
        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].title, "Renewal - +919111111111");
        assert_eq!(
            order.items[0].metadata["renewal_for_subscription"],
            json!(subscription_id)
        );
        assert_eq!(order.items[0].allocated_number(), None);
    }

    #[test]
    fn draft_order_id_is_stable_per_renewal_date() {
        let subscription_id = Uuid::new_v4();
        let request = |day: u32| DraftOrderRequest {
            customer_id: "cus_01".to_string(),
            subscription_id,
            phone_number: "+919111111111".to_string(),
            amount: Decimal::new(29900, 2),
            currency_code: "inr".to_string(),
            renewal_date: chrono::Utc
                .with_ymd_and_hms(2026, 2, day, 10, 0, 0)
                .unwrap(),
        };

        assert_eq!(request(10).to_order().order_id, request(10).order_id());
        assert_ne!(request(10).order_id(), request(11).order_id());
        assert_eq!(
            request(10).to_order().items[0].line_item_id,
            format!("item_{}_20260210", subscription_id.simple())
        );
    }
}
