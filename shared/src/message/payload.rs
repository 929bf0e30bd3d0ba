use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::{EventType, FeedMessage};
use crate::models::Order;

// ==================== Notification Level ====================

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ==================== Payloads ====================

/// Handshake payload (client -> order service)
///
/// Carries the client's protocol version so the service can reject
/// incompatible clients up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// Protocol version
    pub version: u16,
    /// Client name/identifier
    pub client_name: Option<String>,
    /// Client version
    pub client_version: Option<String>,
    /// Client unique id (UUID)
    pub client_id: Option<String>,
}

/// Notification payload (order service -> clients)
///
/// Operator-facing notices: service restarts, courier delays and the like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    /// Extra data (JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Order removal payload (order service -> clients)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderRemovedPayload {
    pub id: i64,
}

// ==================== Convenience Constructors ====================

impl NotificationPayload {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: NotificationLevel::Info,
            data: None,
        }
    }
}

// ==================== Decoded Order Events ====================

/// An order change delivered over the feed
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Created(Order),
    Updated(Order),
    Removed(i64),
}

impl OrderEvent {
    /// Decode an order event from a feed message.
    ///
    /// Returns `Ok(None)` for message types that carry no order data
    /// (handshakes, notifications).
    pub fn from_message(msg: &FeedMessage) -> Result<Option<OrderEvent>, serde_json::Error> {
        match msg.event_type {
            EventType::OrderCreated => Ok(Some(OrderEvent::Created(msg.parse_payload()?))),
            EventType::OrderUpdated => Ok(Some(OrderEvent::Updated(msg.parse_payload()?))),
            EventType::OrderRemoved => {
                let payload: OrderRemovedPayload = msg.parse_payload()?;
                Ok(Some(OrderEvent::Removed(payload.id)))
            }
            EventType::Handshake | EventType::Notification => Ok(None),
        }
    }

    /// Id of the order this event concerns.
    pub fn order_id(&self) -> i64 {
        match self {
            OrderEvent::Created(order) | OrderEvent::Updated(order) => order.id,
            OrderEvent::Removed(id) => *id,
        }
    }
}
