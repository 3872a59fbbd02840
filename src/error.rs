// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replicator.
//!
//! Errors are split by how far they are allowed to travel. Store and
//! document errors are *isolated*: the engine logs them against the
//! collection (or destination) that produced them and carries on with
//! unrelated work. Everything else propagates and ends the run.
//!
//! # Error Categories
//!
//! | Error Type | Isolated | Retryable | Description |
//! |------------|----------|-----------|-------------|
//! | `Store` | Yes | Yes | Query/write failures, timeouts, dropped connections |
//! | `InvalidDocument` | Yes | No | Document without `_id` or otherwise unusable |
//! | `Connection` | Yes | Yes | Address unreachable after connect retries |
//! | `Config` | No | No | Configuration invalid |
//! | `InvalidState` | No | No | Engine state machine violation |
//! | `Internal` | No | No | Unexpected internal error (worker panic, bug) |
//!
//! Use [`ReplicationError::is_isolated()`] to decide whether to catch an
//! error locally, and [`ReplicationError::is_retryable()`] to decide whether
//! a connect attempt is worth repeating.

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Store query or write error.
    ///
    /// Occurs when talking to the source or a destination database.
    /// Typically transient (network timeouts, primary step-downs).
    #[error("Store error ({operation} on {target}): {message}")]
    Store {
        operation: String,
        target: String,
        message: String,
        #[source]
        source: Option<mongodb::error::Error>,
    },

    /// A document that cannot be replicated as-is.
    ///
    /// Occurs when a document arrives without an `_id`.
    #[error("Invalid document in {collection}: {message}")]
    InvalidDocument { collection: String, message: String },

    /// Connection failure after all retries.
    #[error("Connection error ({target}): {message}")]
    Connection { target: String, message: String },

    /// Invalid or missing configuration.
    ///
    /// Occurs during startup. Fix the configuration and restart.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine state machine violation.
    ///
    /// Occurs when `run()` is called while a run is already in progress.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Unexpected internal error.
    ///
    /// Catch-all for errors that shouldn't happen.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a store error from a driver error.
    pub fn store(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: mongodb::error::Error,
    ) -> Self {
        Self::Store {
            operation: operation.into(),
            target: target.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a store error without a driver source.
    pub fn store_msg(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Store {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error is contained at collection or destination granularity.
    ///
    /// Isolated errors are logged and skipped. Anything else terminates the run.
    pub fn is_isolated(&self) -> bool {
        match self {
            Self::Store { .. } => true,
            Self::InvalidDocument { .. } => true,
            Self::Connection { .. } => true,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store { .. } => true,
            Self::Connection { .. } => true,
            Self::InvalidDocument { .. } => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Internal(_) => false,
        }
    }
}
