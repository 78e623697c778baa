// src/health/prober.rs
use crate::config::HealthCheckConfig;
use crate::proxy::Backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Probe timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid probe URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A single reachability check against one backend.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, backend: &Backend) -> Result<(), ProbeError>;
}

/// GET `<backend><path>` and require a 2xx within the timeout.
pub struct HttpProber {
    client: Client,
    path: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(config: &HealthCheckConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create health check HTTP client")?;

        Ok(Self {
            client,
            path: config.path.clone(),
            timeout: config.timeout(),
        })
    }
}

/// The backend's base path followed by the probe path, so a backend
/// registered under `/v1/` is checked under `/v1/` too.
pub fn probe_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let prefix = base.path().trim_end_matches('/');
    let path = path.strip_prefix('/').unwrap_or(path);
    base.join(&format!("{prefix}/{path}"))
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, backend: &Backend) -> Result<(), ProbeError> {
        let url = probe_url(&backend.url, &self.path)?;

        match timeout(self.timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(ProbeError::Status(response.status().as_u16())),
            Ok(Err(e)) if e.is_timeout() => Err(ProbeError::Timeout),
            Ok(Err(e)) => Err(ProbeError::Transport(e.to_string())),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}
