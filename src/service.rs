//! Caller-facing operations, mirroring the HTTP-shaped contract.
//!
//! Every operation takes a request DTO and returns a response DTO or an
//! [`ApiError`] that knows its status code ([`ApiError::status_code`]) and
//! sanitized wire body ([`crate::error::ErrorBody`]). Hosting concerns
//! (routing, CORS, the server itself) stay outside this crate; any HTTP
//! front can map these one-to-one onto POST routes.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth;
use crate::catalog::{self, SiteCatalog};
use crate::connections::{self, ConnectionRecord};
use crate::contract::{BlobSink, UpstreamClient};
use crate::error::ApiError;
use crate::session::TokenBroker;
use crate::transfer::{
    self, sanitize_name, TransferItem, TransferOutcome, TransferStatus, EMBEDDED_REASON,
};

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub site_content_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInResponse {
    pub api_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub api_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkbookRequest {
    pub api_token: String,
    pub workbook_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadWorkbookRequest {
    pub api_token: String,
    pub workbook_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkbookDatasourcesResponse {
    pub workbook_id: String,
    pub datasources: Vec<connections::WorkbookDatasource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionsResponse {
    pub workbook_id: String,
    pub connections: Vec<ConnectionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadWorkbookResponse {
    pub blob_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedDatasource {
    pub datasource_name: String,
    pub blob_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDatasource {
    pub datasource_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadDatasourcesResponse {
    pub uploaded: Vec<UploadedDatasource>,
    pub skipped: Vec<SkippedDatasource>,
}

/// Bundles the collaborators every operation needs. Cheap to clone via
/// the inner `Arc`s; safe to share across concurrent callers.
#[derive(Clone)]
pub struct BridgeService {
    upstream: Arc<dyn UpstreamClient>,
    sink: Arc<dyn BlobSink>,
    broker: TokenBroker,
    staging_root: PathBuf,
}

impl BridgeService {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        sink: Arc<dyn BlobSink>,
        broker: TokenBroker,
        staging_root: PathBuf,
    ) -> Self {
        Self {
            upstream,
            sink,
            broker,
            staging_root,
        }
    }

    /// `POST /signin`: upstream sign-in, returns a fresh opaque token.
    pub async fn sign_in(&self, req: SignInRequest) -> Result<SignInResponse, ApiError> {
        let api_token = auth::sign_in(
            self.upstream.as_ref(),
            &self.broker,
            &req.username,
            &req.password,
            &req.site_content_url,
        )
        .await?;
        Ok(SignInResponse { api_token })
    }

    /// `POST /signout`: revokes the broker session.
    pub async fn sign_out(&self, req: TokenRequest) -> Result<(), ApiError> {
        auth::sign_out(self.upstream.as_ref(), &self.broker, &req.api_token).await
    }

    /// `POST /fetch_data`: flat snapshot of the site's resource graph,
    /// all-or-nothing.
    pub async fn fetch_data(&self, req: TokenRequest) -> Result<SiteCatalog, ApiError> {
        let session = self.broker.resolve(&req.api_token).await?;
        Ok(catalog::fetch_all(self.upstream.as_ref(), &session).await?)
    }

    /// `POST /workbook_datasources`: the workbook's datasource
    /// references, classified as published or embedded.
    pub async fn workbook_datasources(
        &self,
        req: WorkbookRequest,
    ) -> Result<WorkbookDatasourcesResponse, ApiError> {
        let session = self.broker.resolve(&req.api_token).await?;
        let datasources = connections::resolve_workbook_datasources(
            self.upstream.as_ref(),
            &session,
            &req.workbook_id,
        )
        .await?;
        Ok(WorkbookDatasourcesResponse {
            workbook_id: req.workbook_id,
            datasources,
        })
    }

    /// `POST /get_connections`: un-normalized connection detail.
    pub async fn get_connections(
        &self,
        req: WorkbookRequest,
    ) -> Result<ConnectionsResponse, ApiError> {
        let session = self.broker.resolve(&req.api_token).await?;
        let connections =
            connections::raw_connections(self.upstream.as_ref(), &session, &req.workbook_id)
                .await?;
        Ok(ConnectionsResponse {
            workbook_id: req.workbook_id,
            connections,
        })
    }

    /// `POST /download_workbook`: one workbook package through the
    /// pipeline; a failed transfer aborts the operation.
    pub async fn download_workbook(
        &self,
        req: DownloadWorkbookRequest,
    ) -> Result<DownloadWorkbookResponse, ApiError> {
        let session = self.broker.resolve(&req.api_token).await?;
        let file_name = req
            .file_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{}.twbx", req.workbook_id));
        let item = TransferItem::Fetch {
            name: file_name.clone(),
            source_id: req.workbook_id.clone(),
            content_path: format!(
                "sites/{}/workbooks/{}/content",
                session.site_id, req.workbook_id
            ),
            file_name,
        };

        let report = transfer::transfer_all(
            self.upstream.as_ref(),
            self.sink.as_ref(),
            &session,
            vec![item],
            &self.staging_root,
        )
        .await?;

        match report.outcomes.into_iter().next() {
            Some(TransferOutcome {
                status: TransferStatus::Uploaded { locator },
                ..
            }) => Ok(DownloadWorkbookResponse { blob_url: locator }),
            Some(TransferOutcome {
                item,
                status: TransferStatus::Failed { reason },
            }) => Err(ApiError::Transfer { item, reason }),
            other => Err(ApiError::Internal(format!(
                "single-item transfer produced unexpected outcome: {other:?}"
            ))),
        }
    }

    /// `POST /download_workbook_datasources`: every published datasource
    /// the workbook references goes through the pipeline; embedded ones
    /// are skipped without network I/O; one item's failure never blocks
    /// the rest.
    pub async fn download_workbook_datasources(
        &self,
        req: WorkbookRequest,
    ) -> Result<DownloadDatasourcesResponse, ApiError> {
        let session = self.broker.resolve(&req.api_token).await?;
        let resolved = connections::resolve_workbook_datasources(
            self.upstream.as_ref(),
            &session,
            &req.workbook_id,
        )
        .await?;
        info!(
            workbook_id = %req.workbook_id,
            datasources = resolved.len(),
            "starting bulk datasource transfer"
        );

        let items: Vec<TransferItem> = resolved
            .iter()
            .map(|ds| {
                if ds.published {
                    TransferItem::Fetch {
                        name: ds.datasource_name.clone(),
                        source_id: ds.datasource_id.clone(),
                        content_path: format!(
                            "sites/{}/datasources/{}/content",
                            session.site_id, ds.datasource_id
                        ),
                        file_name: format!("{}.tdsx", sanitize_name(&ds.datasource_name)),
                    }
                } else {
                    TransferItem::Skip {
                        name: ds.datasource_name.clone(),
                        reason: EMBEDDED_REASON.to_string(),
                    }
                }
            })
            .collect();

        let report = transfer::transfer_all(
            self.upstream.as_ref(),
            self.sink.as_ref(),
            &session,
            items,
            &self.staging_root,
        )
        .await?;

        // One outcome per input item, in input order, so the two walk in
        // lockstep.
        let mut uploaded = Vec::new();
        let mut skipped = Vec::new();
        for (ds, outcome) in resolved.iter().zip(report.outcomes) {
            match outcome.status {
                TransferStatus::Uploaded { locator } => uploaded.push(UploadedDatasource {
                    datasource_name: ds.datasource_name.clone(),
                    blob_url: locator,
                }),
                TransferStatus::Skipped { reason } | TransferStatus::Failed { reason } => {
                    skipped.push(SkippedDatasource {
                        datasource_name: ds.datasource_name.clone(),
                        reason,
                    })
                }
            }
        }

        Ok(DownloadDatasourcesResponse { uploaded, skipped })
    }
}
