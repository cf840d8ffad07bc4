//! # contract: interfaces for the external collaborators
//!
//! This module defines the traits the core pipeline depends on: the
//! upstream analytics platform's HTTP client ([`UpstreamClient`]), the
//! durable blob store ([`BlobSink`]) and the session map backing the token
//! broker ([`SessionStore`]).
//!
//! ## Interface & Extensibility
//! - Implement [`UpstreamClient`] for a new transport or a test double.
//! - Implement [`BlobSink`] for a new storage backend (the crate ships an
//!   S3 implementation in [`crate::blob`]).
//! - Implement [`SessionStore`] to swap the in-memory map for an external
//!   cache without touching callers.
//!
//! ## Mocking & Testing
//! - All traits are annotated for `mockall`, exported behind the
//!   `test-export-mocks` feature so integration tests can drive the whole
//!   service deterministically.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use mockall::automock;
use serde_json::Value;

use crate::error::{SinkError, UpstreamError};

/// Chunked binary body streamed from the upstream platform.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Authenticated HTTP access to the upstream analytics platform.
///
/// Paths are relative to the versioned API root (e.g. `auth/signin`,
/// `sites/{site_id}/workbooks`). JSON calls carry `Accept:
/// application/json`; authenticated calls carry the platform's opaque auth
/// header. Any non-2xx status must surface as an [`UpstreamError`] with
/// the status code and response body verbatim.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// GET a JSON document.
    async fn get_json(&self, path: &str, auth_token: &str) -> Result<Value, UpstreamError>;

    /// POST a JSON body without the auth header (the sign-in call itself).
    async fn post_json(&self, path: &str, body: Value) -> Result<Value, UpstreamError>;

    /// POST a JSON body on an authenticated session.
    async fn post_json_auth(
        &self,
        path: &str,
        auth_token: &str,
        body: Value,
    ) -> Result<Value, UpstreamError>;

    /// GET binary content as a chunked stream.
    async fn get_stream(&self, path: &str, auth_token: &str) -> Result<ByteStream, UpstreamError>;
}

/// Durable blob storage for transferred artifacts.
///
/// `put` overwrites any existing object under `destination` and tags the
/// content as opaque binary. The returned locator is a stable reference to
/// the stored object.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BlobSink: Send + Sync {
    /// Push a staged local artifact to `destination`, returning its locator.
    async fn put(&self, local_path: &Path, destination: &str) -> Result<String, SinkError>;
}

/// Shared session map behind the token broker.
///
/// Implementations must be safe under concurrent issue/resolve. The
/// in-memory implementation lives in [`crate::session`]; an external cache
/// can be slotted in through this trait.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a freshly issued session under its opaque token.
    async fn insert(&self, token: String, session: crate::session::Session);

    /// Look up a session; `None` for unknown or expired tokens.
    async fn get(&self, token: &str) -> Option<crate::session::Session>;

    /// Drop a session, returning it if it was present and live.
    async fn remove(&self, token: &str) -> Option<crate::session::Session>;
}
