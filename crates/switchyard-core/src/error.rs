//! Error types for request dispatch.
//!
//! [`DispatchError`] is what a handler records with
//! [`DispatchContext::fail`](crate::DispatchContext::fail) and what the
//! router produces for unmatched requests. Every variant maps to an HTTP
//! status and renders to a JSON [`ErrorEnvelope`].

use http::StatusCode;
use serde::{Deserialize, Serialize};
use switchyard_router::AllowedMethods;
use thiserror::Error;

/// Result type alias using [`DispatchError`].
pub type DispatchResult<T> = Result<T, DispatchError>;

/// An error raised while dispatching a request.
///
/// # Example
///
/// ```
/// use switchyard_core::DispatchError;
/// use http::StatusCode;
///
/// let error = DispatchError::http(StatusCode::FORBIDDEN, "admins only");
/// assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
/// assert_eq!(error.code(), "FORBIDDEN");
/// ```
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No route matched the request path.
    #[error("Not found: {path}")]
    NotFound {
        /// The request path.
        path: String,
    },

    /// The path matched, but not under the request method.
    #[error("Method not allowed: use one of {}", .allowed.header_value())]
    MethodNotAllowed {
        /// Methods the path is registered under.
        allowed: AllowedMethods,
    },

    /// A handler rejected the request with an explicit status.
    #[error("{message}")]
    Http {
        /// The response status.
        status: StatusCode,
        /// Human-readable error message.
        message: String,
    },

    /// A handler failed unexpectedly.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl DispatchError {
    /// Creates a not found error for `path`.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a method not allowed error.
    #[must_use]
    pub fn method_not_allowed(allowed: AllowedMethods) -> Self {
        Self::MethodNotAllowed { allowed }
    }

    /// Creates an error with an explicit status.
    #[must_use]
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates an error from a status, using its canonical reason as the message.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        Self::http(status, status.canonical_reason().unwrap_or("Error"))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Http { status, .. } => *status,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true for internal errors.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::NotFound { .. } => "NOT_FOUND".to_string(),
            Self::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED".to_string(),
            Self::Internal { .. } => "INTERNAL_ERROR".to_string(),
            Self::Http { status, .. } => status
                .canonical_reason()
                .map_or_else(|| "HTTP_ERROR".to_string(), screaming_snake),
        }
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                status: self.status_code().as_u16(),
            },
        }
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal {
            message: error.to_string(),
            source: Some(error),
        }
    }
}

impl From<StatusCode> for DispatchError {
    fn from(status: StatusCode) -> Self {
        Self::from_status(status)
    }
}

fn screaming_snake(reason: &str) -> String {
    reason
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// HTTP status code.
    pub status: u16,
}
