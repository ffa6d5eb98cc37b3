//! Unified client error model and mapping helpers.
//! Every failure a caller can observe from the session store, the request
//! wrapper or the credential store is one `AuthError` variant. Only
//! `SessionExpired` is ever acted on centrally; everything else is surfaced
//! to the calling view.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::ApiResponse;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthError {
    /// No response reached the client.
    #[error("network failure: {message}")]
    NetworkFailure { message: String },
    /// The login endpoint answered 4xx.
    #[error("invalid credentials: {message}")]
    InvalidCredentials { message: String },
    /// 401 on an authenticated call.
    #[error("session expired")]
    SessionExpired,
    /// Authenticated, but the role does not permit the action.
    #[error("forbidden: {message}")]
    Forbidden { message: String },
    #[error("server error ({status}): {message}")]
    ServerError { status: u16, message: String },
    /// Any other 4xx on a non-login call.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },
    /// Caught locally before any request was sent.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },
    /// The owning scope was dropped while the request was in flight.
    #[error("request cancelled")]
    Cancelled,
    #[error("credential storage: {message}")]
    Storage { message: String },
    #[error("configuration: {message}")]
    Config { message: String },
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NetworkFailure { .. } => "network_failure",
            AuthError::InvalidCredentials { .. } => "invalid_credentials",
            AuthError::SessionExpired => "session_expired",
            AuthError::Forbidden { .. } => "forbidden",
            AuthError::ServerError { .. } => "server_error",
            AuthError::Rejected { .. } => "rejected",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::InvalidInput { .. } => "invalid_input",
            AuthError::MalformedResponse { .. } => "malformed_response",
            AuthError::Cancelled => "cancelled",
            AuthError::Storage { .. } => "storage",
            AuthError::Config { .. } => "config",
        }
    }

    pub fn network<S: Into<String>>(msg: S) -> Self { AuthError::NetworkFailure { message: msg.into() } }
    pub fn invalid_credentials<S: Into<String>>(msg: S) -> Self { AuthError::InvalidCredentials { message: msg.into() } }
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self { AuthError::InvalidInput { message: msg.into() } }
    pub fn malformed<S: Into<String>>(msg: S) -> Self { AuthError::MalformedResponse { message: msg.into() } }
    pub fn storage<S: Into<String>>(msg: S) -> Self { AuthError::Storage { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { AuthError::Config { message: msg.into() } }

    /// HTTP status the error originated from, when there was one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AuthError::SessionExpired => Some(401),
            AuthError::Forbidden { .. } => Some(403),
            AuthError::RateLimited { .. } => Some(429),
            AuthError::ServerError { status, .. } | AuthError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Errors a view should show as a transient notice. Session expiry and
    /// cancellation are handled elsewhere and never reach the user as text.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, AuthError::SessionExpired | AuthError::Cancelled)
    }

    /// Classify a non-success response from any non-login endpoint.
    pub fn from_response(resp: &ApiResponse) -> Self {
        let message = resp.error_message();
        match resp.status {
            401 => AuthError::SessionExpired,
            403 => AuthError::Forbidden { message },
            429 => AuthError::RateLimited { retry_after_secs: resp.header("retry-after").and_then(|v| v.trim().parse().ok()) },
            s if s >= 500 => AuthError::ServerError { status: s, message },
            s => AuthError::Rejected { status: s, message },
        }
    }
}
