//! Connection Error Types
//!
//! Error handling for the connection boundary: handshake, send, close and
//! inbound subscription failures.

use thiserror::Error;

/// Main connection error type
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Handshake with the bus failed (no automatic retry)
    #[error("Handshake failed for {endpoint}: {message}")]
    Handshake {
        endpoint: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Outbound frame could not be written
    #[error("Send failed: {message}")]
    Send {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation on a connection that is not open
    #[error("Connection closed: {0}")]
    Closed(String),

    /// `subscribe` called more than once
    #[error("Inbound frames already subscribed for {0}")]
    AlreadySubscribed(String),

    /// Endpoint URL rejected before connecting
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Frame could not be routed by the hub
    #[error("Unroutable frame: {0}")]
    Unroutable(String),

    /// Connection timeout
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for connection operations
pub type Result<T> = std::result::Result<T, ConnectionError>;

impl ConnectionError {
    /// Create a handshake error
    pub fn handshake(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handshake {
            endpoint: endpoint.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a handshake error with source
    pub fn handshake_with_source(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Handshake {
            endpoint: endpoint.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a send error
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
            source: None,
        }
    }

    /// Create a send error with source
    pub fn send_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Send {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a closed error
    pub fn closed(name: impl Into<String>) -> Self {
        Self::Closed(name.into())
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an unroutable-frame error
    pub fn unroutable(message: impl Into<String>) -> Self {
        Self::Unroutable(message.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Check if a fresh `start()` could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectionError::Handshake { .. }
                | ConnectionError::Send { .. }
                | ConnectionError::Timeout { .. }
                | ConnectionError::Io { .. }
        )
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            ConnectionError::Handshake { .. } => "handshake",
            ConnectionError::Send { .. } => "send",
            ConnectionError::Closed(_) => "closed",
            ConnectionError::AlreadySubscribed(_) => "already_subscribed",
            ConnectionError::InvalidUrl { .. } => "invalid_url",
            ConnectionError::Unroutable(_) => "unroutable",
            ConnectionError::Timeout { .. } => "timeout",
            ConnectionError::Io { .. } => "io",
        }
    }
}

/// Convert standard I/O errors to connection errors
impl From<std::io::Error> for ConnectionError {
    fn from(error: std::io::Error) -> Self {
        ConnectionError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}
