//! Error types for WeTime.

use thiserror::Error;

/// Errors that can occur in WeTime operations.
#[derive(Error, Debug)]
pub enum WeTimeError {
    #[error("Invalid recurrence rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Failed to fetch feed for calendar {calendar}: {reason}")]
    FeedFetch { calendar: String, reason: String },

    #[error("Feed parse error: {0}")]
    FeedParse(String),

    #[error("ICS generation error: {0}")]
    Serialization(String),

    #[error("Access denied to calendar {0}")]
    VisibilityDenied(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid query window: {0}")]
    InvalidWindow(String),

    #[error("Couple error: {0}")]
    Couple(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for WeTime operations.
pub type WeTimeResult<T> = Result<T, WeTimeError>;
