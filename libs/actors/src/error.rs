//! Actor Error Types

use network::ConnectionError;
use thiserror::Error;

/// Inbound frame could not be turned into an envelope
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed JSON: {0}")]
    Json(String),

    #[error("Envelope must be a JSON object")]
    NotAnObject,

    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    /// An ask with no `from` could never be answered
    #[error("Ask '{0}' has no sender to reply to")]
    MissingSender(String),

    #[error("Field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

impl ParseError {
    pub fn invalid_field(field: &'static str, expected: &'static str) -> Self {
        Self::InvalidField { field, expected }
    }
}

/// Capacity admission or execution failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// `pre_check` returned false
    #[error("Capacity '{name}' is unavailable")]
    Unavailable { name: String },

    #[error("Capacity '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

impl CapacityError {
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self::Unavailable { name: name.into() }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Name of the capacity that produced the error
    pub fn capacity(&self) -> &str {
        match self {
            CapacityError::Unavailable { name } | CapacityError::Failed { name, .. } => name,
        }
    }
}

/// Main actor error type
#[derive(Error, Debug)]
pub enum ActorError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Ask was not answered in time
    #[error("Request {corr_id} timed out after {timeout_ms}ms")]
    Timeout { corr_id: String, timeout_ms: u64 },

    #[error("Ask messages must have a correlation ID")]
    MissingCorrelationId,

    #[error("Correlation ID {0} is already pending")]
    DuplicateCorrelationId(String),

    /// Pending request dropped without a reply (actor stopped)
    #[error("Request {0} abandoned")]
    Abandoned(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Capacity error: {0}")]
    Capacity(#[from] CapacityError),

    /// Payload did not match the type expected at the handler boundary
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Handler failed: {0}")]
    Handler(String),

    /// Operation on an actor whose tasks have exited
    #[error("Actor {0} is stopped")]
    Stopped(String),
}

/// Result type alias for actor operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    pub fn timeout(corr_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            corr_id: corr_id.into(),
            timeout_ms,
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ActorError::Timeout { .. })
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            ActorError::Parse(_) => "parse",
            ActorError::Timeout { .. } => "timeout",
            ActorError::MissingCorrelationId => "missing_correlation_id",
            ActorError::DuplicateCorrelationId(_) => "duplicate_correlation_id",
            ActorError::Abandoned(_) => "abandoned",
            ActorError::Connection(_) => "connection",
            ActorError::Capacity(_) => "capacity",
            ActorError::Payload(_) => "payload",
            ActorError::Handler(_) => "handler",
            ActorError::Stopped(_) => "stopped",
        }
    }
}
