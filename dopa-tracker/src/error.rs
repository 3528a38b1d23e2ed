//! Error types for dopa-tracker
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for dopa-tracker
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file or settings errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors bubbled up from dopa-common
    #[error(transparent)]
    Common(#[from] dopa_common::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Ledger service rejected or failed a settlement call
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Semantic analyzer call failed
    #[error("Analyzer error: {0}")]
    Analyzer(String),

    /// Capture payload could not be accepted
    #[error("Capture error: {0}")]
    Capture(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using dopa-tracker Error
pub type Result<T> = std::result::Result<T, Error>;
