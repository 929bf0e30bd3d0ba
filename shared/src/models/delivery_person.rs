//! Delivery Person Model

use serde::{Deserialize, Serialize};

/// Delivery person assigned to an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryPerson {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
}
