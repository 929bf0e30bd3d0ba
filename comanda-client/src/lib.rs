//! Comanda Client - order board client for the Comanda order service
//!
//! Keeps a local order collection synchronized over HTTP and the
//! realtime feed, and provides the grid virtualization math board UIs
//! render with.

pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod grid;
pub mod http;
pub mod sync;

pub use api::{HttpOrderApi, MemoryOrderApi, OrderApi};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use feed::{FeedClient, FeedError, FeedTransport};
pub use grid::{GridSpec, GridWindow, ScrollThrottle};
pub use http::HttpClient;
pub use sync::{OrderSync, StatusCounts, SyncPhase, SyncSnapshot};

// Re-export shared types for convenience
pub use shared::message::{EventType, FeedMessage, OrderEvent};
pub use shared::models::{
    Order, OrderDraft, OrderItem, OrderItemDraft, OrderPatch, OrderStatus, OrderType,
};
pub use shared::response::ApiResponse;
