//! Token broker: maps caller-facing opaque tokens to upstream credentials.
//!
//! The broker is the sole owner of the session mapping's lifecycle. Every
//! other component receives a resolved [`Session`] and never mutates it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::contract::SessionStore;
use crate::error::ApiError;

/// Upstream credentials behind one opaque api_token.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// The upstream platform's own short-lived auth token.
    pub upstream_token: String,
    /// The upstream site the credentials are scoped to.
    pub site_id: String,
}

// The upstream token is a credential; keep it out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("upstream_token_len", &self.upstream_token.len())
            .field("site_id", &self.site_id)
            .finish()
    }
}

struct StoredSession {
    session: Session,
    issued_at: Instant,
}

/// Mutex-guarded in-memory session map with lazy TTL eviction.
///
/// Read-mostly, write-on-issue. Expired entries are evicted on the `get`
/// or `remove` that observes them; there is no background sweep.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
    ttl: Option<Duration>,
}

impl InMemorySessionStore {
    /// `ttl: None` disables expiry (sessions live for the process lifetime).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn expired(&self, issued_at: Instant) -> bool {
        match self.ttl {
            Some(ttl) => issued_at.elapsed() >= ttl,
            None => false,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, token: String, session: Session) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(token, StoredSession {
            session,
            issued_at: Instant::now(),
        });
    }

    async fn get(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match sessions.get(token) {
            Some(stored) => self.expired(stored.issued_at),
            None => return None,
        };
        if expired {
            sessions.remove(token);
            debug!("evicted expired session on resolve");
            return None;
        }
        sessions.get(token).map(|stored| stored.session.clone())
    }

    async fn remove(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let stored = sessions.remove(token)?;
        if self.expired(stored.issued_at) {
            return None;
        }
        Some(stored.session)
    }
}

/// Issues, resolves and revokes opaque caller tokens against an injected
/// [`SessionStore`].
#[derive(Clone)]
pub struct TokenBroker {
    store: Arc<dyn SessionStore>,
}

impl TokenBroker {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Generates a fresh unguessable token (random 128-bit UUID) and stores
    /// the session under it.
    pub async fn issue(&self, upstream_token: String, site_id: String) -> String {
        let token = Uuid::new_v4().to_string();
        info!(site_id = %site_id, "issuing broker session");
        self.store
            .insert(
                token.clone(),
                Session {
                    upstream_token,
                    site_id,
                },
            )
            .await;
        token
    }

    /// Pure lookup; [`ApiError::InvalidSession`] for unknown or expired tokens.
    pub async fn resolve(&self, token: &str) -> Result<Session, ApiError> {
        self.store.get(token).await.ok_or(ApiError::InvalidSession)
    }

    /// Drops the session, returning the revoked credentials so the caller
    /// can also sign out upstream.
    pub async fn revoke(&self, token: &str) -> Result<Session, ApiError> {
        self.store
            .remove(token)
            .await
            .ok_or(ApiError::InvalidSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(ttl: Option<Duration>) -> TokenBroker {
        TokenBroker::new(Arc::new(InMemorySessionStore::new(ttl)))
    }

    #[tokio::test]
    async fn resolve_returns_what_issue_stored() {
        let broker = broker(None);
        let token = broker
            .issue("T1".to_string(), "S1".to_string())
            .await;
        let session = broker.resolve(&token).await.expect("token should resolve");
        assert_eq!(session.upstream_token, "T1");
        assert_eq!(session.site_id, "S1");
    }

    #[tokio::test]
    async fn issued_tokens_are_unique() {
        let broker = broker(None);
        let a = broker.issue("T1".to_string(), "S1".to_string()).await;
        let b = broker.issue("T1".to_string(), "S1".to_string()).await;
        assert_ne!(a, b, "two issues must never share a token");
    }

    #[tokio::test]
    async fn resolve_of_unknown_token_is_invalid_session() {
        let broker = broker(None);
        let err = broker
            .resolve(&Uuid::new_v4().to_string())
            .await
            .expect_err("never-issued token must not resolve");
        assert!(matches!(err, ApiError::InvalidSession));
    }

    #[tokio::test]
    async fn revoked_token_no_longer_resolves() {
        let broker = broker(None);
        let token = broker.issue("T1".to_string(), "S1".to_string()).await;
        let revoked = broker.revoke(&token).await.expect("revoke should succeed");
        assert_eq!(revoked.upstream_token, "T1");
        let err = broker.resolve(&token).await.expect_err("revoked token");
        assert!(matches!(err, ApiError::InvalidSession));
    }

    #[tokio::test]
    async fn revoke_of_unknown_token_is_invalid_session() {
        let broker = broker(None);
        let err = broker.revoke("nope").await.expect_err("unknown token");
        assert!(matches!(err, ApiError::InvalidSession));
    }

    #[tokio::test]
    async fn zero_ttl_expires_sessions_immediately() {
        let broker = broker(Some(Duration::ZERO));
        let token = broker.issue("T1".to_string(), "S1".to_string()).await;
        let err = broker.resolve(&token).await.expect_err("expired token");
        assert!(matches!(err, ApiError::InvalidSession));
    }

    #[test]
    fn debug_redacts_the_upstream_token() {
        let session = Session {
            upstream_token: "super-secret".to_string(),
            site_id: "S1".to_string(),
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("S1"));
    }
}
