//! Error types for Bdash.
//!
//! Defines the main error enum returned across the command surface. Every
//! failure of an external call ends up here as a value; nothing in the core
//! panics on a driver or transport fault.

use thiserror::Error;

use crate::model::QueryId;

/// User-correctable problems detected before any side effect happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The query references a data source that is not configured.
    #[error("DataSource is missing")]
    MissingDataSource,

    /// The sharing target has no access token configured.
    #[error("Set your {service} access token")]
    MissingToken { service: &'static str },

    /// No data source exists at all, so a query cannot be created.
    #[error("Please create a data source first")]
    NoDataSource,

    /// No adapter is registered for the data source type.
    #[error("Unsupported data source type: {kind}")]
    UnsupportedDataSource { kind: String },

    /// The query id does not exist (it may have been deleted).
    #[error("Query {0} does not exist")]
    UnknownQuery(QueryId),

    /// The query has no tabular result to format or share.
    #[error("Query has no result to share")]
    NoResult,
}

/// Main error type for Bdash operations.
#[derive(Error, Debug)]
pub enum BdashError {
    /// Validation failures; state is unchanged.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An execute was issued while the same query is still running.
    #[error("Query {0} is already running")]
    QueryBusy(QueryId),

    /// The data source driver reported a failure.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Gist / Bdash Server HTTP errors (network, auth, bad responses).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration errors (invalid config file, bad URLs, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Clipboard could not be written.
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BdashError {
    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a clipboard error with the given message.
    pub fn clipboard(msg: impl Into<String>) -> Self {
        Self::Clipboard(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::QueryBusy(_) => "Query Busy",
            Self::Execution(_) => "Execution Error",
            Self::Transport(_) => "Transport Error",
            Self::Config(_) => "Configuration Error",
            Self::Clipboard(_) => "Clipboard Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Whether repeating the same call could succeed without user action.
    ///
    /// Nothing in the crate retries on its own; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Clipboard(_))
    }

    /// Returns the validation error if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(v) => Some(v),
            _ => None,
        }
    }
}

/// Result type alias using BdashError.
pub type Result<T> = std::result::Result<T, BdashError>;
