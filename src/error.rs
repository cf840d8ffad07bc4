//! Error taxonomy shared across the crate.
//!
//! Leaf collaborators surface concrete errors ([`UpstreamError`],
//! [`SinkError`]); the service layer folds everything into [`ApiError`],
//! which knows its caller-facing status code and sanitized wire body.

use serde::Serialize;
use thiserror::Error;

/// A failed interaction with the upstream analytics platform.
///
/// Covers non-2xx responses (detail carries the response body verbatim),
/// malformed response envelopes, and transport-level failures where no
/// response was received (`status == 0`).
#[derive(Debug, Clone, Error)]
#[error("upstream returned {status}: {detail}")]
pub struct UpstreamError {
    pub status: u16,
    pub detail: String,
}

impl UpstreamError {
    /// A 2xx response whose body did not match the expected envelope shape.
    pub fn malformed(status: u16, context: &str) -> Self {
        Self {
            status,
            detail: format!("malformed response envelope: {context}"),
        }
    }

    /// Request never produced a response (connect failure, timeout, etc).
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self {
            status: 0,
            detail: format!("transport error: {err}"),
        }
    }
}

/// A failed push to the blob store.
#[derive(Debug, Clone, Error)]
#[error("blob sink: {0}")]
pub struct SinkError(pub String);

/// Caller-facing error for every service operation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The opaque api_token is unknown, revoked or expired.
    #[error("invalid or expired api_token")]
    InvalidSession,

    /// The upstream platform rejected or garbled a request.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Streaming or staging failed for one content item.
    #[error("transfer failed for {item}: {reason}")]
    Transfer { item: String, reason: String },

    /// The blob store rejected a push.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Anything not caller-induced. Detail is logged, never surfaced.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for the caller-facing response. Caller-induced errors
    /// map to 4xx; only [`ApiError::Internal`] is a 5xx.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidSession => 401,
            ApiError::Upstream(_) | ApiError::Transfer { .. } | ApiError::Sink(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }
}

/// Structured error body returned to callers: `{error, details?}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    /// Maps an [`ApiError`] to its wire shape. Internal detail is logged
    /// here and replaced with a generic message.
    pub fn from_error(err: &ApiError) -> Self {
        match err {
            ApiError::InvalidSession => Self {
                error: "Invalid or expired api_token".to_string(),
                details: None,
            },
            ApiError::Upstream(upstream) => Self {
                error: "Upstream request failed".to_string(),
                details: Some(format!("{} - {}", upstream.status, upstream.detail)),
            },
            ApiError::Transfer { item, reason } => Self {
                error: "Transfer failed".to_string(),
                details: Some(format!("{item}: {reason}")),
            },
            ApiError::Sink(sink) => Self {
                error: "Blob upload failed".to_string(),
                details: Some(sink.0.clone()),
            },
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "unexpected internal error");
                Self {
                    error: "Internal error".to_string(),
                    details: None,
                }
            }
        }
    }
}
