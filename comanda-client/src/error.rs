//! Client error types

use shared::models::OrderStatus;
use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success envelope code
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication required
    #[error("Authentication required")]
    Unauthorized,

    /// Permission denied
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Illegal order status transition, rejected before any request
    #[error("Illegal status transition: {from} -> {to}")]
    Transition { from: OrderStatus, to: OrderStatus },

    /// Feed transport failure
    #[error("Feed error: {0}")]
    Feed(String),

    /// Superseded by a newer request, or the client is shutting down
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Internal(_) => true,
            _ => false,
        }
    }

    /// Whether this is a silent cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
