//! Order creation and update payloads

use serde::{Deserialize, Serialize};

use crate::models::{
    DeliveryPerson, ItemAddition, Order, OrderItem, OrderStatus, OrderType, PaymentMethod,
    PaymentStatus,
};
use crate::util;

/// Line item in a create payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderItemDraft {
    /// Product reference
    pub product_id: i64,
    /// Product name at order time
    pub name: String,
    /// Price in currency unit (menu price at order time)
    pub unit_price: f64,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub additions: Vec<ItemAddition>,
}

impl OrderItemDraft {
    /// Convert into the item shape the server stores, freezing prices.
    pub fn into_item(self) -> OrderItem {
        OrderItem {
            product_id: self.product_id,
            name: self.name,
            unit_price: self.unit_price,
            quantity: self.quantity,
            note: self.note,
            additions: self.additions,
        }
    }
}

/// Create order payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderDraft {
    /// Establishment the order belongs to; adapters fill this from their
    /// configuration when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub establishment_id: Option<i64>,
    pub order_type: OrderType,
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    /// Delivery address (DELIVERY orders only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub payment_method: PaymentMethod,
    /// Delivery fee in currency unit (zero for non-delivery orders)
    pub delivery_fee: f64,
    pub items: Vec<OrderItemDraft>,
}

/// Partial order update
///
/// Absent fields are left unchanged; a field cannot be cleared to null
/// through a patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    /// Amount tendered in currency unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_paid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Delivery assignment (None = no change)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_person: Option<DeliveryPerson>,
    /// Replacement line items (None = no change)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItem>>,
    /// Total amount in currency unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self == &OrderPatch::default()
    }

    /// Merge this patch into an order, refreshing `updated_at`.
    ///
    /// This is the local half of an optimistic update; the server applies
    /// the same merge on its side and returns the authoritative result.
    pub fn apply_to(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(method) = self.payment_method {
            order.payment_method = method;
        }
        if let Some(payment_status) = self.payment_status {
            order.payment_status = payment_status;
        }
        if let Some(amount) = self.amount_paid {
            order.amount_paid = Some(amount);
        }
        if let Some(address) = &self.address {
            order.address = Some(address.clone());
        }
        if let Some(note) = &self.note {
            order.note = Some(note.clone());
        }
        if let Some(person) = &self.delivery_person {
            order.delivery_person = Some(person.clone());
        }
        if let Some(items) = &self.items {
            order.items = items.clone();
        }
        if let Some(total) = self.total_amount {
            order.total_amount = total;
        }
        order.updated_at = util::now_millis();
    }

    /// Patch carrying only a status change.
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch marking the order paid with the given method and amount.
    pub fn payment(method: PaymentMethod, amount: f64) -> Self {
        Self {
            payment_method: Some(method),
            payment_status: Some(PaymentStatus::Paid),
            amount_paid: Some(amount),
            ..Self::default()
        }
    }

    /// Patch assigning a delivery person.
    pub fn assign(person: DeliveryPerson) -> Self {
        Self {
            delivery_person: Some(person),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            id: 1,
            order_type: OrderType::Delivery,
            status: OrderStatus::Pending,
            customer_name: "Ana".to_string(),
            customer_phone: None,
            address: Some("Rua A, 10".to_string()),
            note: None,
            items: vec![],
            total_amount: 30.0,
            delivery_fee: 5.0,
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::Pending,
            amount_paid: None,
            delivery_person: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = OrderPatch::status(OrderStatus::Preparing);
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, "{\"status\":\"PREPARING\"}");
    }

    #[test]
    fn test_apply_merges_subset() {
        let mut order = sample_order();
        let patch = OrderPatch::payment(PaymentMethod::Pix, 35.0);
        patch.apply_to(&mut order);

        assert_eq!(order.payment_method, PaymentMethod::Pix);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.amount_paid, Some(35.0));
        // Untouched fields survive
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.address.as_deref(), Some("Rua A, 10"));
    }

    #[test]
    fn test_empty_patch_changes_nothing_but_timestamp() {
        let mut order = sample_order();
        let before = order.clone();
        OrderPatch::default().apply_to(&mut order);

        order.updated_at = before.updated_at;
        assert_eq!(order, before);
        assert!(OrderPatch::default().is_empty());
    }
}
