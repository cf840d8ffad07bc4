//! CLI glue: argument parsing and one-shot invocations of the service.
//!
//! Each subcommand builds the real collaborators from the YAML config,
//! signs in with credentials from the environment (`UPSTREAM_USERNAME`,
//! `UPSTREAM_PASSWORD`, optional `UPSTREAM_SITE`), runs one operation and
//! prints its JSON response. All business logic stays in the library
//! modules; this is strictly orchestration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::blob::S3Sink;
use crate::config::{load_config, Config};
use crate::service::{
    BridgeService, DownloadWorkbookRequest, SignInRequest, TokenRequest, WorkbookRequest,
};
use crate::session::{InMemorySessionStore, TokenBroker};
use crate::upstream::RestUpstream;

/// CLI for bi-bucket: broker analytics sessions and mirror content packages.
#[derive(Parser)]
#[clap(
    name = "bi-bucket",
    version,
    about = "Broker analytics-platform sessions and mirror workbook/datasource packages into object storage"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the site's projects, workbooks, views and datasources as flat JSON
    Fetch {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// List a workbook's datasource references, classified published/embedded
    Datasources {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        workbook_id: String,
    },
    /// Dump a workbook's raw connection detail
    Connections {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        workbook_id: String,
    },
    /// Download one workbook package and push it to the blob store
    DownloadWorkbook {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        workbook_id: String,
        /// Destination file name; defaults to <workbook_id>.twbx
        #[clap(long)]
        file_name: Option<String>,
    },
    /// Mirror every published datasource a workbook references into the blob store
    SyncDatasources {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        workbook_id: String,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Fetch { config } => {
            let (service, token) = connect(&config).await?;
            let catalog = service
                .fetch_data(TokenRequest { api_token: token.clone() })
                .await
                .map_err(|e| anyhow::Error::msg(e.to_string()))?;
            print_json(&catalog)?;
            disconnect(&service, token).await;
        }
        Commands::Datasources {
            config,
            workbook_id,
        } => {
            let (service, token) = connect(&config).await?;
            let response = service
                .workbook_datasources(WorkbookRequest {
                    api_token: token.clone(),
                    workbook_id,
                })
                .await
                .map_err(|e| anyhow::Error::msg(e.to_string()))?;
            print_json(&response)?;
            disconnect(&service, token).await;
        }
        Commands::Connections {
            config,
            workbook_id,
        } => {
            let (service, token) = connect(&config).await?;
            let response = service
                .get_connections(WorkbookRequest {
                    api_token: token.clone(),
                    workbook_id,
                })
                .await
                .map_err(|e| anyhow::Error::msg(e.to_string()))?;
            print_json(&response)?;
            disconnect(&service, token).await;
        }
        Commands::DownloadWorkbook {
            config,
            workbook_id,
            file_name,
        } => {
            let (service, token) = connect(&config).await?;
            let response = service
                .download_workbook(DownloadWorkbookRequest {
                    api_token: token.clone(),
                    workbook_id,
                    file_name,
                })
                .await
                .map_err(|e| anyhow::Error::msg(e.to_string()))?;
            print_json(&response)?;
            disconnect(&service, token).await;
        }
        Commands::SyncDatasources {
            config,
            workbook_id,
        } => {
            let (service, token) = connect(&config).await?;
            let response = service
                .download_workbook_datasources(WorkbookRequest {
                    api_token: token.clone(),
                    workbook_id,
                })
                .await
                .map_err(|e| anyhow::Error::msg(e.to_string()))?;
            print_json(&response)?;
            disconnect(&service, token).await;
        }
    }

    Ok(())
}

/// Builds the service from config and signs in with env credentials.
async fn connect(config_path: &PathBuf) -> Result<(BridgeService, String)> {
    let config = load_config(config_path)?;
    let service = service_from_config(&config).await?;

    let username =
        std::env::var("UPSTREAM_USERNAME").context("UPSTREAM_USERNAME missing in environment")?;
    let password =
        std::env::var("UPSTREAM_PASSWORD").context("UPSTREAM_PASSWORD missing in environment")?;
    let site_content_url = std::env::var("UPSTREAM_SITE").unwrap_or_default();

    let response = service
        .sign_in(SignInRequest {
            username,
            password,
            site_content_url,
        })
        .await
        .map_err(|e| anyhow::Error::msg(e.to_string()))?;
    tracing::info!("signed in, broker token issued");
    Ok((service, response.api_token))
}

async fn service_from_config(config: &Config) -> Result<BridgeService> {
    let upstream = Arc::new(RestUpstream::new(
        &config.upstream.base_url,
        &config.upstream.api_version,
        config.upstream_timeout(),
    ));
    let sink = Arc::new(
        S3Sink::new(&config.blob)
            .await
            .map_err(|e| anyhow::Error::msg(e.to_string()))?,
    );
    let broker = TokenBroker::new(Arc::new(InMemorySessionStore::new(config.session_ttl())));
    Ok(BridgeService::new(
        upstream,
        sink,
        broker,
        config.staging_dir.clone(),
    ))
}

/// Best-effort session teardown after a one-shot command.
async fn disconnect(service: &BridgeService, token: String) {
    if let Err(e) = service.sign_out(TokenRequest { api_token: token }).await {
        tracing::warn!(error = %e, "sign-out after command failed");
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
