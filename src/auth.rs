//! Upstream sign-in and sign-out against the platform's auth endpoints.
//!
//! The credentials envelope is decoded into typed records here, once, at
//! the client boundary; the broker only ever sees validated fields.

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::contract::UpstreamClient;
use crate::error::{ApiError, UpstreamError};
use crate::session::TokenBroker;

#[derive(Debug, Deserialize)]
struct SignInEnvelope {
    credentials: SignedInCredentials,
}

#[derive(Debug, Deserialize)]
struct SignedInCredentials {
    token: String,
    site: SiteRef,
}

#[derive(Debug, Deserialize)]
struct SiteRef {
    id: String,
}

/// Signs in upstream with name/password credentials and issues a fresh
/// opaque api_token for the caller.
pub async fn sign_in(
    upstream: &dyn UpstreamClient,
    broker: &TokenBroker,
    username: &str,
    password: &str,
    site_content_url: &str,
) -> Result<String, ApiError> {
    let payload = json!({
        "credentials": {
            "name": username,
            "password": password,
            "site": { "contentUrl": site_content_url },
        }
    });

    let value = upstream.post_json("auth/signin", payload).await?;
    let envelope: SignInEnvelope = serde_json::from_value(value)
        .map_err(|e| UpstreamError::malformed(200, &format!("credentials envelope: {e}")))?;

    info!(site_id = %envelope.credentials.site.id, "upstream sign-in succeeded");
    Ok(broker
        .issue(envelope.credentials.token, envelope.credentials.site.id)
        .await)
}

/// Revokes the broker session and makes a best-effort upstream sign-out.
///
/// The local revocation is authoritative; an upstream signout failure is
/// logged and swallowed, since the upstream token expires on its own.
pub async fn sign_out(
    upstream: &dyn UpstreamClient,
    broker: &TokenBroker,
    api_token: &str,
) -> Result<(), ApiError> {
    let session = broker.revoke(api_token).await?;
    if let Err(e) = upstream
        .post_json_auth("auth/signout", &session.upstream_token, json!({}))
        .await
    {
        warn!(error = %e, "upstream sign-out failed after local revocation");
    }
    Ok(())
}
