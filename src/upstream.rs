//! reqwest-backed [`UpstreamClient`] for the analytics platform's REST API.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, error};

use crate::contract::{ByteStream, UpstreamClient};
use crate::error::UpstreamError;

/// Header carrying the platform's own session token on authenticated calls.
pub const AUTH_HEADER: &str = "X-Tableau-Auth";

/// HTTP client bound to one upstream server and API version.
///
/// Stateless and reentrant; share it behind an `Arc` across concurrent
/// operations.
pub struct RestUpstream {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    timeout: Duration,
}

impl RestUpstream {
    pub fn new(base_url: &str, api_version: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.base_url,
            self.api_version,
            path.trim_start_matches('/')
        )
    }

    /// Passes 2xx responses through; anything else becomes an
    /// [`UpstreamError`] carrying the response body verbatim.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().clone();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| String::from("<failed to decode response body>"));
        error!(status = status.as_u16(), url = %url, "upstream returned error status");
        Err(UpstreamError {
            status: status.as_u16(),
            detail: body,
        })
    }

    async fn decode_json(resp: reqwest::Response) -> Result<Value, UpstreamError> {
        let status = resp.status().as_u16();
        resp.json::<Value>()
            .await
            .map_err(|e| UpstreamError::malformed(status, &e.to_string()))
    }
}

#[async_trait]
impl UpstreamClient for RestUpstream {
    async fn get_json(&self, path: &str, auth_token: &str) -> Result<Value, UpstreamError> {
        let url = self.endpoint(path);
        debug!(url = %url, "upstream GET");
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .header(ACCEPT, "application/json")
            .header(AUTH_HEADER, auth_token)
            .send()
            .await
            .map_err(UpstreamError::transport)?;
        let resp = Self::check(resp).await?;
        Self::decode_json(resp).await
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, UpstreamError> {
        let url = self.endpoint(path);
        debug!(url = %url, "upstream POST");
        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::transport)?;
        let resp = Self::check(resp).await?;
        Self::decode_json(resp).await
    }

    async fn post_json_auth(
        &self,
        path: &str,
        auth_token: &str,
        body: Value,
    ) -> Result<Value, UpstreamError> {
        let url = self.endpoint(path);
        debug!(url = %url, "upstream authenticated POST");
        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTH_HEADER, auth_token)
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::transport)?;
        let resp = Self::check(resp).await?;
        Self::decode_json(resp).await
    }

    async fn get_stream(&self, path: &str, auth_token: &str) -> Result<ByteStream, UpstreamError> {
        let url = self.endpoint(path);
        debug!(url = %url, "upstream streaming GET");
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .header(AUTH_HEADER, auth_token)
            .send()
            .await
            .map_err(UpstreamError::transport)?;
        let resp = Self::check(resp).await?;
        Ok(resp
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_version_and_path() {
        let upstream = RestUpstream::new(
            "https://example.online.server.com/",
            "3.27",
            Duration::from_secs(30),
        );
        assert_eq!(
            upstream.endpoint("auth/signin"),
            "https://example.online.server.com/api/3.27/auth/signin"
        );
        assert_eq!(
            upstream.endpoint("/sites/S1/projects"),
            "https://example.online.server.com/api/3.27/sites/S1/projects"
        );
    }
}
