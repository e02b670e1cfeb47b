//! Error types for quarry-link.
//!
//! Every error carries a stable machine-readable [`ErrorKind`] next to its
//! human-readable message so callers can branch on "bad credentials" versus
//! "network down" without string matching.

use std::fmt;
use thiserror::Error;

/// Result type alias for quarry-link operations.
pub type Result<T> = std::result::Result<T, QuarryError>;

/// A single statement that reported a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFailure {
    /// 1-based position of the statement in the submitted batch.
    pub index: usize,
    /// Server supplied detail for the failure.
    pub message: String,
}

impl fmt::Display for StatementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "- Query {}: {}", self.index, self.message)
    }
}

/// A schema violation found while validating a statement result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path to the offending value, rooted at the row index.
    pub path: String,
    /// What was wrong with the value.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "- @{}: {}", self.path, self.message)
    }
}

fn format_failures(failures: &[StatementFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors raised while building, sending or reconciling queries.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// A call was attempted while no usable connection exists.
    #[error("No connection: {0}")]
    NoConnection(String),

    /// The query writer or batch was malformed (duplicate parameter,
    /// missing target, conflicting clauses).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The request could not be issued as configured (missing schema,
    /// missing credentials, unsupported operation).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The server reply did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// One or more statements reported a non-success status.
    #[error("One or more queries returned a non-successful status code:\n{}", format_failures(.0))]
    QueryFailure(Vec<StatementFailure>),

    /// A statement result failed schema validation.
    #[error("Query {statement} failed to parse\n{}", format_issues(.issues))]
    ParseFailure {
        statement: usize,
        issues: Vec<ValidationIssue>,
    },

    /// Sign-in, sign-up or sign-out was rejected by the server.
    #[error("{0}")]
    AuthFailure(String),

    /// A `one` or `maybe` statement produced more than one row.
    #[error("Too many results: {0}")]
    TooManyResults(String),

    /// The server answered an RPC call with an error object.
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Stable, machine-readable classification of a [`QuarryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoConnection,
    InvalidQuery,
    InvalidRequest,
    InvalidResponse,
    QueryFailure,
    ParseFailure,
    AuthFailure,
    TooManyResults,
    Server,
    WebSocket,
    Timeout,
    Http,
    Serialization,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoConnection => "no_connection",
            ErrorKind::InvalidQuery => "invalid_query",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::QueryFailure => "query_failure",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::TooManyResults => "too_many_results",
            ErrorKind::Server => "server_error",
            ErrorKind::WebSocket => "websocket",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Http => "http",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QuarryError {
    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuarryError::NoConnection(_) => ErrorKind::NoConnection,
            QuarryError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            QuarryError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            QuarryError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            QuarryError::QueryFailure(_) => ErrorKind::QueryFailure,
            QuarryError::ParseFailure { .. } => ErrorKind::ParseFailure,
            QuarryError::AuthFailure(_) => ErrorKind::AuthFailure,
            QuarryError::TooManyResults(_) => ErrorKind::TooManyResults,
            QuarryError::ServerError(_) => ErrorKind::Server,
            QuarryError::WebSocketError(_) => ErrorKind::WebSocket,
            QuarryError::TimeoutError(_) => ErrorKind::Timeout,
            QuarryError::HttpError(_) => ErrorKind::Http,
            QuarryError::SerializationError(_) => ErrorKind::Serialization,
            QuarryError::ConfigurationError(_) => ErrorKind::Configuration,
        }
    }

    /// Whether a fresh connection might make the same call succeed.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            QuarryError::NoConnection(_)
                | QuarryError::WebSocketError(_)
                | QuarryError::TimeoutError(_)
        )
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        QuarryError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for QuarryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QuarryError::TimeoutError(err.to_string())
        } else {
            QuarryError::HttpError(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for QuarryError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        QuarryError::WebSocketError(err.to_string())
    }
}
