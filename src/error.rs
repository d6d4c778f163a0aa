//! Crate-level error type

use thiserror::Error;

/// Errors surfaced by the context engine
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Token counting failed: {0}")]
    TokenCount(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, ContextError>;
