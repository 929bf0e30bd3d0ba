//! Order Model

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::DeliveryPerson;
use crate::money;

/// Order lifecycle status
///
/// Orders advance one step at a time along
/// PENDING -> PREPARING -> READY -> DELIVERING -> DELIVERED;
/// any non-terminal order may be cancelled instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Delivering,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivering,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Wire name, as serialized in JSON and query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Delivering => "DELIVERING",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether this status can never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// The single forward step in the lifecycle, `None` for terminal statuses.
    pub fn next_status(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::Delivering),
            OrderStatus::Delivering => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if next == OrderStatus::Cancelled {
            return !self.is_terminal();
        }
        self.next_status() == Some(next)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    #[default]
    Delivery,
    DineIn,
    Pickup,
}

impl OrderType {
    /// All channels.
    pub const ALL: [OrderType; 3] = [OrderType::Delivery, OrderType::DineIn, OrderType::Pickup];

    /// Wire name, as serialized in JSON and query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Delivery => "DELIVERY",
            OrderType::DineIn => "DINE_IN",
            OrderType::Pickup => "PICKUP",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Credit,
    Debit,
    Pix,
}

/// Payment settlement state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

/// Addition selected on a line item (extra cheese, larger size, ...)
///
/// Priced per product unit: the line total multiplies additions by the
/// item quantity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemAddition {
    pub id: i64,
    pub name: String,
    /// Price in currency unit (snapshot at order time)
    pub unit_price: f64,
    pub quantity: i32,
}

/// Order line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    /// Product reference
    pub product_id: i64,
    /// Product name snapshot at order time
    pub name: String,
    /// Price in currency unit (snapshot at order time)
    pub unit_price: f64,
    pub quantity: i32,
    pub note: Option<String>,
    pub additions: Vec<ItemAddition>,
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    /// Delivery address (DELIVERY orders only)
    pub address: Option<String>,
    pub note: Option<String>,
    pub items: Vec<OrderItem>,
    /// Total amount in currency unit (server-computed)
    pub total_amount: f64,
    /// Delivery fee in currency unit (zero for non-delivery orders)
    pub delivery_fee: f64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Amount tendered in currency unit
    pub amount_paid: Option<f64>,
    pub delivery_person: Option<DeliveryPerson>,
    /// Creation timestamp (Unix milliseconds, immutable)
    pub created_at: i64,
    /// Last mutation timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Order {
    /// Whether the order is still in flight (non-terminal status).
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Recompute the total from line items and the delivery fee.
    ///
    /// The server remains authoritative for `total_amount`; this exists to
    /// detect divergence, not to correct it.
    pub fn computed_total(&self) -> f64 {
        money::to_f64(money::order_total(&self.items, self.delivery_fee))
    }

    /// Whether the stored total disagrees with the recomputed one beyond
    /// the money tolerance.
    pub fn total_diverges(&self) -> bool {
        !money::money_eq(self.total_amount, self.computed_total())
    }
}
