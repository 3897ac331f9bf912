//! Error types for the Powergate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Powergate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Proxy errors ---
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    // --- Ledger errors ---
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of one metered chat request.
///
/// Pre-debit variants (`ModelNotFound`, `ModelDisabled`,
/// `InsufficientCredit`) never touch the ledger. Post-debit variants are
/// only surfaced after exactly one refund has been committed.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model is disabled: {0}")]
    ModelDisabled(String),

    #[error("Insufficient credit: required {required}, balance {balance}")]
    InsufficientCredit { required: i64, balance: i64 },

    #[error("Upstream returned {status}: {body}")]
    UpstreamHttp { status: u16, body: String },

    #[error("Upstream transport error: {0}")]
    UpstreamTransport(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt ledger entry: {0}")]
    CorruptEntry(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}
