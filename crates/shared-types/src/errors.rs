//! # Error Types
//!
//! Errors raised by the shared primitives themselves. Each subsystem defines
//! its own error enum on top of these.

use thiserror::Error;

/// Parsing an identifier from its textual form failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Producing the canonical encoding of a value failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Canonical encoding failed: {0}")]
pub struct CanonicalError(pub String);
