//! Realtime feed message types
//!
//! Shared between the order service and its clients, for in-process
//! (memory) and network (TCP) delivery of order events.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use uuid::Uuid;

use crate::models::Order;

pub mod payload;
pub use payload::*;

/// Protocol version
pub const PROTOCOL_VERSION: u16 = 1;

/// Maximum accepted payload size per frame (1 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Feed event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Client introduction on connect
    Handshake = 0,
    /// Operator-facing notice
    Notification = 1,
    /// A new order entered the system
    OrderCreated = 2,
    /// An existing order changed
    OrderUpdated = 3,
    /// An order left the system
    OrderRemoved = 4,
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventType::Handshake),
            1 => Ok(EventType::Notification),
            2 => Ok(EventType::OrderCreated),
            3 => Ok(EventType::OrderUpdated),
            4 => Ok(EventType::OrderRemoved),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Handshake => write!(f, "handshake"),
            EventType::Notification => write!(f, "notification"),
            EventType::OrderCreated => write!(f, "order_created"),
            EventType::OrderUpdated => write!(f, "order_updated"),
            EventType::OrderRemoved => write!(f, "order_removed"),
        }
    }
}

/// Feed message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage {
    pub message_id: Uuid,
    pub event_type: EventType,
    pub payload: Vec<u8>,
}

impl FeedMessage {
    pub fn new(event_type: EventType, payload: Vec<u8>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            event_type,
            payload,
        }
    }

    /// Create a handshake message
    pub fn handshake(payload: &HandshakePayload) -> Self {
        Self::new(
            EventType::Handshake,
            serde_json::to_vec(payload).expect("Failed to serialize handshake payload"),
        )
    }

    /// Create a notification message
    pub fn notification(payload: &NotificationPayload) -> Self {
        Self::new(
            EventType::Notification,
            serde_json::to_vec(payload).expect("Failed to serialize notification"),
        )
    }

    /// Create an order-created message carrying the full order
    pub fn order_created(order: &Order) -> Self {
        Self::new(
            EventType::OrderCreated,
            serde_json::to_vec(order).expect("Failed to serialize order"),
        )
    }

    /// Create an order-updated message carrying the full order
    pub fn order_updated(order: &Order) -> Self {
        Self::new(
            EventType::OrderUpdated,
            serde_json::to_vec(order).expect("Failed to serialize order"),
        )
    }

    /// Create an order-removed message carrying only the id
    pub fn order_removed(id: i64) -> Self {
        Self::new(
            EventType::OrderRemoved,
            serde_json::to_vec(&OrderRemovedPayload { id })
                .expect("Failed to serialize order removal"),
        )
    }

    /// Parse the payload as the given type
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, OrderType, PaymentMethod, PaymentStatus};

    fn sample_order() -> Order {
        Order {
            id: 42,
            order_type: OrderType::Pickup,
            status: OrderStatus::Pending,
            customer_name: "Bruno".to_string(),
            customer_phone: Some("+55 11 91234-0000".to_string()),
            address: None,
            note: None,
            items: vec![],
            total_amount: 12.0,
            delivery_fee: 0.0,
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::Pending,
            amount_paid: None,
            delivery_person: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_event_type_wire_ids() {
        for ty in [
            EventType::Handshake,
            EventType::Notification,
            EventType::OrderCreated,
            EventType::OrderUpdated,
            EventType::OrderRemoved,
        ] {
            assert_eq!(EventType::try_from(ty as u8), Ok(ty));
        }
        assert!(EventType::try_from(99).is_err());
    }

    #[test]
    fn test_handshake_message() {
        let payload = HandshakePayload {
            version: PROTOCOL_VERSION,
            client_name: Some("test-client".to_string()),
            client_version: Some("0.1.0".to_string()),
            client_id: None,
        };

        let msg = FeedMessage::handshake(&payload);
        assert_eq!(msg.event_type, EventType::Handshake);
        assert!(!msg.message_id.is_nil());

        let parsed: HandshakePayload = msg.parse_payload().unwrap();
        assert_eq!(parsed.version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_order_event_decoding() {
        let order = sample_order();

        let created = FeedMessage::order_created(&order);
        match OrderEvent::from_message(&created).unwrap() {
            Some(OrderEvent::Created(decoded)) => assert_eq!(decoded, order),
            other => panic!("unexpected event: {other:?}"),
        }

        let removed = FeedMessage::order_removed(42);
        match OrderEvent::from_message(&removed).unwrap() {
            Some(OrderEvent::Removed(id)) => assert_eq!(id, 42),
            other => panic!("unexpected event: {other:?}"),
        }

        // Non-order messages decode to None
        let note = FeedMessage::notification(&NotificationPayload::info("Hi", "there"));
        assert!(OrderEvent::from_message(&note).unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let mut msg = FeedMessage::order_created(&sample_order());
        msg.payload = b"not json".to_vec();
        assert!(OrderEvent::from_message(&msg).is_err());
    }
}
