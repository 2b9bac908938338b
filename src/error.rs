//! Error types for the Floodgate engine.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Malformed rule or check request, rejected before reaching an engine.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The resolver found no active rule for the request.
    #[error("No rule configured for resource '{resource}'")]
    NoRuleConfigured { resource: String },

    /// A rule referenced by id does not exist.
    #[error("Rule not found: {0}")]
    RuleNotFound(Uuid),

    /// The counter store could not serve a read or write.
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// The analytics pipeline is saturated and an event was dropped.
    #[error("Analytics pipeline overloaded")]
    Overloaded,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
