//! Error types for stockfolio
//!
//! This module defines domain-specific error types that provide clear,
//! actionable error messages to users.

use thiserror::Error;

/// Validation errors for user input (CLI arguments and the TUI form).
///
/// These errors are shown directly to users and should be clear and actionable.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Ticker is required")]
    TickerRequired,

    #[error("Invalid ticker format: {0}")]
    InvalidTicker(String),

    #[error("Broker is required")]
    BrokerRequired,

    #[error("No broker named '{0}' is registered")]
    UnknownBroker(String),

    #[error("Broker '{0}' is inactive")]
    InactiveBroker(String),

    #[error("A broker named '{0}' already exists")]
    DuplicateBroker(String),

    #[error("Invalid quantity format: {0}")]
    InvalidQuantity(String),

    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),

    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    #[error("Price must be positive, got {0}")]
    NonPositivePrice(f64),

    #[error("Invalid date format: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Purchase date cannot be in the future")]
    FutureDate,

    #[error("Unknown currency: {0} (expected USD or KRW)")]
    UnknownCurrency(String),
}

/// Failures of the persistent key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    Db(#[from] sled::Error),

    #[error("Failed to encode or decode stored data: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("No record with id '{0}'")]
    NotFound(String),
}

/// Failures when talking to the remote quote API.
///
/// These are never fatal for aggregation: callers fall back to cached
/// values or average cost and report the symbol as stale.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("Network failure while fetching {symbol}: {reason}")]
    NetworkFailure { symbol: String, reason: String },

    #[error("Rate limited while fetching {0} (HTTP 429)")]
    RateLimited(String),

    #[error("Malformed response for {symbol}: {reason}")]
    MalformedResponse { symbol: String, reason: String },

    #[error("No quote available for {0}")]
    Unavailable(String),
}

/// Failures of backup export and restore.
///
/// A corrupt backup aborts the restore before anything is written; prior
/// persisted state is never touched.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Corrupt backup file: {0}")]
    CorruptBackup(String),

    #[error("Backup I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Broker registry failures: invalid input or a persistence problem.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
