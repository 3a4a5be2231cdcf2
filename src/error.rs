//! Error taxonomy for the solve and practice cores.
//!
//! Three classes cover every failure the controllers can surface:
//! - [`CoreError::InvalidInput`]: the caller handed us something unusable
//!   (non-image bytes, empty answer, unknown difficulty). Rejected locally,
//!   nothing is sent upstream.
//! - [`CoreError::Service`]: talking to the reasoning service failed, with a
//!   [`ServiceErrorKind`] saying how (auth, rate limit, transport, remote).
//! - [`CoreError::MalformedResponse`]: the service answered but the payload
//!   failed shape validation; carries the offending field so operators can
//!   tell broken prompts apart from broken transport.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("reasoning service error ({kind}): {message}")]
    Service {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("malformed service response: field '{field}': {message}")]
    MalformedResponse { field: String, message: String },
}

/// How a reasoning-service call failed. Retries are never automatic; the
/// kind is for status mapping and diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Missing or rejected credentials.
    Auth,
    /// The service asked us to back off.
    RateLimit,
    /// Connection, DNS or timeout trouble before a response arrived.
    Transport,
    /// The service replied with a non-auth, non-ratelimit failure status.
    Remote,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate limit",
            Self::Transport => "transport",
            Self::Remote => "remote",
        };
        f.write_str(s)
    }
}

impl CoreError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    pub fn service(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self::Service { kind, message: message.into() }
    }

    pub fn malformed(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse { field: field.into(), message: message.into() }
    }

    /// The fixed error every AI-backed operation returns when no API key was
    /// configured at startup.
    pub fn credentials_missing() -> Self {
        Self::service(
            ServiceErrorKind::Auth,
            "OPENAI_API_KEY is not configured; AI-backed operations are unavailable",
        )
    }

    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Service { kind: ServiceErrorKind::Auth, .. })
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::Service { kind: ServiceErrorKind::Auth, .. } => StatusCode::UNAUTHORIZED,
            Self::Service { kind: ServiceErrorKind::RateLimit, .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Service { .. } | Self::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
