//! Data models
//!
//! Shared between the order service API and the client crates.
//! All IDs are `i64`, all timestamps Unix milliseconds.

pub mod delivery_person;
pub mod draft;
pub mod order;

// Re-exports
pub use delivery_person::*;
pub use draft::*;
pub use order::*;
