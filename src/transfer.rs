//! Transfer pipeline: stream upstream content to local staging, push the
//! staged artifact to the blob sink, and record one outcome per item.
//!
//! The pipeline is an outcome-collecting fold: one item's failure is
//! recorded in its own [`TransferOutcome`] and never aborts the remaining
//! items. Items pre-marked as skips (embedded datasources) produce an
//! outcome without any network I/O. Staging lives in a per-operation
//! temporary directory; each staged file is removed as soon as its push
//! finishes, and the directory guard cleans up whatever is left on
//! cancellation or failure.

use std::collections::HashSet;
use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::contract::{BlobSink, UpstreamClient};
use crate::error::ApiError;
use crate::session::Session;

/// Skip reason recorded for datasource connections without a published match.
pub const EMBEDDED_REASON: &str = "Embedded datasource";

/// One unit of work for the pipeline, in caller-defined order.
#[derive(Debug, Clone)]
pub enum TransferItem {
    /// Stream `content_path` from upstream and push it as `file_name`.
    /// `source_id` disambiguates destination-name collisions.
    Fetch {
        name: String,
        source_id: String,
        content_path: String,
        file_name: String,
    },
    /// Recorded as skipped without touching the network.
    Skip { name: String, reason: String },
}

impl TransferItem {
    pub fn name(&self) -> &str {
        match self {
            TransferItem::Fetch { name, .. } | TransferItem::Skip { name, .. } => name,
        }
    }
}

/// Terminal state of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Uploaded { locator: String },
    Skipped { reason: String },
    Failed { reason: String },
}

/// Exactly one per input item, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub item: String,
    pub status: TransferStatus,
}

/// Full outcome sequence plus convenience splits.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub outcomes: Vec<TransferOutcome>,
}

impl TransferReport {
    /// Outcomes that produced a durable locator.
    pub fn uploaded(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, TransferStatus::Uploaded { .. }))
    }

    /// Outcomes that did not: skipped and failed items alike.
    pub fn not_uploaded(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.status, TransferStatus::Uploaded { .. }))
    }
}

/// Replaces filesystem- and key-hostile characters in a human-readable
/// name before it becomes a destination name.
pub fn sanitize_name(name: &str) -> String {
    name.replace(&['/', '\\', ':', '*', '?', '"', '<', '>', '|'][..], "_")
        .replace(' ', "_")
}

/// Picks an unused destination name within this batch; a collision gets
/// the item's upstream id appended before the extension.
fn unique_destination(file_name: &str, source_id: &str, used: &mut HashSet<String>) -> String {
    if used.insert(file_name.to_string()) {
        return file_name.to_string();
    }
    let candidate = match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{source_id}.{ext}"),
        None => format!("{file_name}_{source_id}"),
    };
    used.insert(candidate.clone());
    candidate
}

/// Runs every item through stream → stage → sink, returning one outcome
/// per item in input order. Only the staging-directory setup can fail the
/// call as a whole; per-item errors are folded into the report.
pub async fn transfer_all(
    upstream: &dyn UpstreamClient,
    sink: &dyn BlobSink,
    session: &Session,
    items: Vec<TransferItem>,
    staging_root: &Path,
) -> Result<TransferReport, ApiError> {
    tokio::fs::create_dir_all(staging_root)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to create staging root: {e}")))?;
    let staging = tempfile::Builder::new()
        .prefix("transfer-")
        .tempdir_in(staging_root)
        .map_err(|e| ApiError::Internal(format!("failed to create staging directory: {e}")))?;

    let mut outcomes = Vec::with_capacity(items.len());
    let mut used_names = HashSet::new();

    for item in items {
        let outcome = match item {
            TransferItem::Skip { name, reason } => {
                info!(item = %name, reason = %reason, "skipping item without network I/O");
                TransferOutcome {
                    item: name,
                    status: TransferStatus::Skipped { reason },
                }
            }
            TransferItem::Fetch {
                name,
                source_id,
                content_path,
                file_name,
            } => {
                let destination = unique_destination(&file_name, &source_id, &mut used_names);
                let staging_path = staging.path().join(&destination);
                let result = fetch_and_push(
                    upstream,
                    sink,
                    session,
                    &name,
                    &content_path,
                    &staging_path,
                    &destination,
                )
                .await;

                // Remove the staging artifact no matter how the push went.
                if let Err(e) = tokio::fs::remove_file(&staging_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %staging_path.display(), error = %e, "failed to remove staging artifact");
                    }
                }

                match result {
                    Ok(locator) => {
                        info!(item = %name, locator = %locator, "transfer succeeded");
                        TransferOutcome {
                            item: name,
                            status: TransferStatus::Uploaded { locator },
                        }
                    }
                    Err(e) => {
                        error!(item = %name, error = %e, "transfer failed, continuing with remaining items");
                        TransferOutcome {
                            item: name,
                            status: TransferStatus::Failed {
                                reason: e.to_string(),
                            },
                        }
                    }
                }
            }
        };
        outcomes.push(outcome);
    }

    Ok(TransferReport { outcomes })
}

/// Stream → stage → sink for one item.
async fn fetch_and_push(
    upstream: &dyn UpstreamClient,
    sink: &dyn BlobSink,
    session: &Session,
    item: &str,
    content_path: &str,
    staging_path: &Path,
    destination: &str,
) -> Result<String, ApiError> {
    stage_stream(upstream, session, item, content_path, staging_path).await?;
    let locator = sink.put(staging_path, destination).await?;
    Ok(locator)
}

/// Writes the upstream content stream to `staging_path` in bounded-size
/// chunks, so memory stays O(chunk) regardless of artifact size.
async fn stage_stream(
    upstream: &dyn UpstreamClient,
    session: &Session,
    item: &str,
    content_path: &str,
    staging_path: &Path,
) -> Result<(), ApiError> {
    let transfer_err = |reason: String| ApiError::Transfer {
        item: item.to_string(),
        reason,
    };

    let mut stream = upstream
        .get_stream(content_path, &session.upstream_token)
        .await?;
    let mut file = tokio::fs::File::create(staging_path)
        .await
        .map_err(|e| transfer_err(format!("failed to create staging file: {e}")))?;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| transfer_err(format!("stream read failed: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| transfer_err(format!("staging write failed: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| transfer_err(format!("staging flush failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_spaces_and_hostile_characters() {
        assert_eq!(sanitize_name("Sales Data"), "Sales_Data");
        assert_eq!(sanitize_name("a/b:c*d"), "a_b_c_d");
    }

    #[test]
    fn colliding_destinations_get_the_source_id_appended() {
        let mut used = HashSet::new();
        assert_eq!(
            unique_destination("Sales.tdsx", "ds1", &mut used),
            "Sales.tdsx"
        );
        assert_eq!(
            unique_destination("Sales.tdsx", "ds2", &mut used),
            "Sales_ds2.tdsx"
        );
        assert_eq!(unique_destination("raw", "ds3", &mut used), "raw");
        assert_eq!(unique_destination("raw", "ds4", &mut used), "raw_ds4");
    }
}
