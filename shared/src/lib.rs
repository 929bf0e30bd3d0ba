//! Shared types for the Comanda suite
//!
//! Common types used across the client crates: domain models, money
//! helpers, realtime feed message types and the API response envelope.

pub mod message;
pub mod models;
pub mod money;
pub mod response;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Feed message re-exports (for convenient access)
pub use message::{EventType, FeedMessage, OrderEvent};
