//! Shared primitives for the overlay proxy workspace.
//!
//! This crate holds the small pieces every other crate leans on:
//! error location tracking and secret handling. It has no knowledge
//! of the proxy lifecycle itself.

pub mod error;
pub mod redacted_key;


pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_key::RedactedAuthKey;
