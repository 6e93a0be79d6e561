//! Failure taxonomy for ledger synchronization.
//!
//! Every failure that can end a sync run is classified into exactly one `SyncError` variant at
//! the boundary where it is first observed (HTTP client, JSON adapter, storage). The state
//! machine only ever sees these variants, never raw transport or storage errors.

use std::error::Error as StdError;
use std::sync::Arc;

/// Shared, cloneable underlying cause of a `SyncError`.
pub type ErrorCause = Arc<dyn StdError + Send + Sync>;

/// Errors that can end a sync run
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        cause: Option<ErrorCause>,
    },

    #[error("Request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Server error (HTTP {http_code}): {message}")]
    Server {
        message: String,
        http_code: u16,
        server_message: Option<String>,
    },

    #[error("Authentication failed (HTTP {http_code})")]
    Authentication { http_code: u16 },

    #[error("Malformed response: {message}")]
    Parse {
        message: String,
        #[source]
        cause: Option<ErrorCause>,
    },

    #[error("Unsupported server version {detected} (supported: {supported})")]
    ApiVersion { detected: String, supported: String },

    #[error("Invalid {field}: {details}")]
    Validation { field: String, details: String },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Unexpected error: {message}")]
    Unknown {
        message: String,
        #[source]
        cause: Option<ErrorCause>,
    },
}

impl SyncError {
    pub fn network(message: impl Into<String>) -> Self {
        SyncError::Network {
            message: message.into(),
            cause: None,
        }
    }

    pub fn network_with(
        message: impl Into<String>,
        cause: impl StdError + Send + Sync + 'static,
    ) -> Self {
        SyncError::Network {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        SyncError::Parse {
            message: message.into(),
            cause: None,
        }
    }

    pub fn parse_with(
        message: impl Into<String>,
        cause: impl StdError + Send + Sync + 'static,
    ) -> Self {
        SyncError::Parse {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        SyncError::Unknown {
            message: message.into(),
            cause: None,
        }
    }

    pub fn unknown_with(
        message: impl Into<String>,
        cause: impl StdError + Send + Sync + 'static,
    ) -> Self {
        SyncError::Unknown {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Classify a non-success HTTP status. 401 is an authentication failure, anything else a
    /// server error carrying the response body, if any.
    pub fn from_status(http_code: u16, body: Option<String>) -> Self {
        if http_code == 401 {
            return SyncError::Authentication { http_code };
        }
        let server_message = body
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        SyncError::Server {
            message: format!("request failed with status {http_code}"),
            http_code,
            server_message,
        }
    }

    pub fn validation(field: impl Into<String>, details: impl Into<String>) -> Self {
        SyncError::Validation {
            field: field.into(),
            details: details.into(),
        }
    }

    /// Whether repeating the same operation could succeed without any change on either side.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { .. } | SyncError::Timeout { .. } => true,
            SyncError::Server { http_code, .. } => (500..=599).contains(http_code),
            SyncError::Authentication { .. }
            | SyncError::Parse { .. }
            | SyncError::ApiVersion { .. }
            | SyncError::Validation { .. }
            | SyncError::Cancelled
            | SyncError::Unknown { .. } => false,
        }
    }

    /// HTTP status carried by this error, if it came from a response.
    pub fn http_code(&self) -> Option<u16> {
        match self {
            SyncError::Server { http_code, .. } | SyncError::Authentication { http_code } => {
                Some(*http_code)
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::parse_with(e.to_string(), e)
    }
}
