use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order lifecycle. `Processing` is a virtual state reported for async
/// placements before the worker has materialized the row; it never reaches
/// the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Only pending orders may be confirmed.
    pub fn can_confirm(self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Cancellation is allowed before and after confirmation; cancelled is
    /// terminal.
    pub fn can_cancel(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient_name: String,
    pub phone: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_detail: Option<String>,
    pub postal_code: String,
}

/// A line after pricing: the name and unit price are captured here so later
/// product edits never alter this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedItem {
    pub product_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: i32,
}

impl PricedItem {
    pub fn subtotal(&self) -> i32 {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_amount: i32,
    pub recipient_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub address_detail: Option<String>,
    pub postal_code: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn shipping_address(&self) -> Option<ShippingAddress> {
        let recipient_name = self.recipient_name.clone()?;
        Some(ShippingAddress {
            recipient_name,
            phone: self.phone.clone().unwrap_or_default(),
            address: self.address.clone().unwrap_or_default(),
            address_detail: self.address_detail.clone(),
            postal_code: self.postal_code.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_amount: i32,
    pub recipient_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub address_detail: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::order_items)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: i32,
    pub subtotal: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::order_items)]
pub struct NewOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: i32,
    pub subtotal: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("processing"), None);
    }

    #[test]
    fn transition_policy() {
        assert!(OrderStatus::Pending.can_confirm());
        assert!(!OrderStatus::Confirmed.can_confirm());
        assert!(!OrderStatus::Cancelled.can_confirm());

        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Confirmed.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn subtotal_is_price_times_quantity() {
        let item = PricedItem {
            product_id: Uuid::new_v4(),
            deal_id: None,
            product_name: "A".to_string(),
            quantity: 3,
            unit_price: 1500,
        };
        assert_eq!(item.subtotal(), 4500);
    }
}
