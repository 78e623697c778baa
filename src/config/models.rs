// src/config/models.rs
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Rotation order follows the order of this list.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: Url,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_health_path")]
    pub path: String,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            path: default_health_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    /// Upper bound on a single forwarded request. Unbounded when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Backend {0} must use http or https")]
    UnsupportedScheme(Url),

    #[error("Backend {0} has no host")]
    MissingHost(Url),

    #[error("Backend {0} is listed more than once")]
    DuplicateBackend(Url),

    #[error("Invalid health check settings: {0}")]
    InvalidHealthCheck(&'static str),

    #[error("Invalid proxy settings: {0}")]
    InvalidProxy(&'static str),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            let url = &backend.url;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::UnsupportedScheme(url.clone()));
            }
            if url.host_str().is_none() {
                return Err(ConfigError::MissingHost(url.clone()));
            }
            if !seen.insert(url.as_str()) {
                return Err(ConfigError::DuplicateBackend(url.clone()));
            }
        }

        if self.health_check.interval_secs == 0 {
            return Err(ConfigError::InvalidHealthCheck("interval_secs must be > 0"));
        }
        if self.health_check.timeout_secs == 0 {
            return Err(ConfigError::InvalidHealthCheck("timeout_secs must be > 0"));
        }
        // A probe still in flight at the next tick would race the next round's write.
        if self.health_check.timeout_secs >= self.health_check.interval_secs {
            return Err(ConfigError::InvalidHealthCheck(
                "timeout_secs must be below interval_secs",
            ));
        }
        if self.proxy.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidProxy("timeout_secs must be > 0"));
        }

        if self.backends.is_empty() {
            tracing::warn!("No backends configured, every request will be answered with 503");
        }

        Ok(())
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
