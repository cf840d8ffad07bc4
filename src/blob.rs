//! S3-backed [`BlobSink`] for durable artifact storage.

use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream as S3Body;
use tracing::{error, info};

use crate::config::BlobConfig;
use crate::contract::BlobSink;
use crate::error::SinkError;

/// Pushes staged artifacts to an S3-compatible bucket.
///
/// Objects are written with `application/octet-stream` and overwrite any
/// existing object under the same key. The returned locator is the
/// `s3://bucket/key` form of the object.
pub struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3Sink {
    /// Builds a sink from config; credentials come from the ambient AWS
    /// environment (env vars, profile, instance role).
    pub async fn new(config: &BlobConfig) -> Result<Self, SinkError> {
        if config.bucket.trim().is_empty() {
            return Err(SinkError("bucket must be set".to_string()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let prefix = config
            .prefix
            .as_deref()
            .unwrap_or("")
            .trim_matches('/')
            .to_string();
        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix,
        })
    }

    fn key_for(&self, destination: &str) -> String {
        if self.prefix.is_empty() {
            destination.to_string()
        } else {
            format!("{}/{}", self.prefix, destination)
        }
    }
}

#[async_trait]
impl BlobSink for S3Sink {
    async fn put(&self, local_path: &Path, destination: &str) -> Result<String, SinkError> {
        let key = self.key_for(destination);
        let body = S3Body::from_path(local_path).await.map_err(|e| {
            SinkError(format!(
                "failed to open staged artifact {}: {e}",
                local_path.display()
            ))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(bucket = %self.bucket, key = %key, error = %e, "put_object failed");
                SinkError(format!("put_object failed for {key}: {e}"))
            })?;

        info!(bucket = %self.bucket, key = %key, "uploaded artifact to object storage");
        Ok(format!("s3://{}/{}", self.bucket, key))
    }
}
