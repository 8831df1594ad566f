//! Error types for database devices.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Backend diagnostics are preserved as fields so callers can retry or report at a
//! higher layer.

use crate::models::{ParamType, Role};
use thiserror::Error;

/// Local parameter binding failures. These never reach the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("Unknown data type '{tag}' in \"{types}\"")]
    InvalidType { types: String, tag: char },

    #[error("Number of specified types ({types}) and values ({values}) does not match")]
    CountMismatch { types: usize, values: usize },

    #[error("Number of specified parameters ({given}) does not match required parameters ({required})")]
    ArityMismatch { given: usize, required: usize },

    #[error("Value at position {index} cannot be bound as {expected}")]
    Incompatible { index: usize, expected: ParamType },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: no host configured for role '{role}'")]
    NoHostConfigured { role: Role },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Compile error: {message} (query: {query})")]
    Compile {
        message: String,
        query: String,
        /// Native error code, e.g. "42601" for a PostgreSQL syntax error
        code: Option<String>,
    },

    #[error("Execution error: {message} (query: {query})")]
    Execution {
        message: String,
        query: String,
        code: Option<String>,
    },

    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("Backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    #[error("Connection {connection_id} is not checked out (double release)")]
    DoubleRelease { connection_id: u64 },

    #[error("Connection {connection_id} does not belong to device {device}")]
    ForeignConnection { connection_id: u64, device: String },

    #[error("Connection pool exhausted: {max_connections} connections in use")]
    PoolExhausted { max_connections: u32 },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a missing-host error.
    pub fn no_host(role: Role) -> Self {
        Self::NoHostConfigured { role }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Wrap a backend error raised while compiling `query`.
    pub fn compile(err: sqlx::Error, query: &str) -> Self {
        let (message, code) = native_diagnostic(&err);
        Self::Compile {
            message,
            query: query.to_string(),
            code,
        }
    }

    /// Wrap a backend error raised while running `query`.
    pub fn execution(err: sqlx::Error, query: &str) -> Self {
        let (message, code) = native_diagnostic(&err);
        Self::Execution {
            message,
            query: query.to_string(),
            code,
        }
    }

    /// Create an execution error that has no native source.
    pub fn execution_message(message: impl Into<String>, query: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            query: query.into(),
            code: None,
        }
    }

    /// Create a compile error that has no native source.
    pub fn compile_message(message: impl Into<String>, query: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
            query: query.into(),
            code: None,
        }
    }

    /// Create a backend unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::NoHostConfigured { .. } => Some("Register a host for this role with add_host"),
            Self::PoolExhausted { .. } => {
                Some("Release connections sooner or raise max_connections")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Timeout { .. }
                | Self::PoolExhausted { .. }
                | Self::BackendUnavailable { .. }
        )
    }

    /// Native error code attached to compile and execution errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Compile { code, .. } | Self::Execution { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Extract the backend message and error code from an sqlx error.
fn native_diagnostic(err: &sqlx::Error) -> (String, Option<String>) {
    match err {
        sqlx::Error::Database(db_err) => (
            db_err.message().to_string(),
            db_err.code().map(|c| c.to_string()),
        ),
        other => (other.to_string(), None),
    }
}

/// Convert sqlx errors raised outside of a query context.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::Database(db_err) => DbError::Execution {
                message: db_err.message().to_string(),
                query: String::new(),
                code: db_err.code().map(|c| c.to_string()),
            },
            sqlx::Error::WorkerCrashed => DbError::unavailable("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
