//! Static YAML configuration for the bridge.
//!
//! This is the only place untrusted YAML is parsed; everything downstream
//! works with the typed [`Config`]. Secrets (sign-in credentials, AWS
//! keys) never live in the file; they come from the environment at the
//! CLI boundary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub blob: BlobConfig,
    /// Root under which per-operation staging directories are created.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Broker session lifetime in seconds; 0 disables expiry.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Server root, e.g. `https://prod-in-a.online.example.com`.
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    /// Custom endpoint URL for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_session_ttl_secs() -> u64 {
    14_400
}

fn default_api_version() -> String {
    "3.27".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_secs > 0).then(|| Duration::from_secs(self.session_ttl_secs))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }

    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.upstream.base_url,
            api_version = %self.upstream.api_version,
            bucket = %self.blob.bucket,
            staging_dir = %self.staging_dir.display(),
            session_ttl_secs = self.session_ttl_secs,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

/// Loads a static YAML config file. Returns context-rich errors for the
/// CLI to surface.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = match std::fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: Config = match serde_yaml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    config.trace_loaded();
    Ok(config)
}
