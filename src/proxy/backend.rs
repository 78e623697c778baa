// src/proxy/backend.rs
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use url::Url;

/// One upstream server: a fixed address plus a liveness flag that the
/// health monitor writes and request dispatch reads.
#[derive(Debug)]
pub struct Backend {
    pub id: String,
    pub url: Url,

    // Runtime state
    alive: RwLock<bool>,
    last_health_check: RwLock<Option<DateTime<Utc>>>,
}

impl Backend {
    /// New backends are considered alive until a probe says otherwise.
    pub fn new(url: Url) -> Self {
        // Two backends on one host:port under different base paths keep distinct ids.
        let id = format!(
            "{}:{}{}",
            url.host_str().unwrap_or("unknown"),
            url.port_or_known_default().unwrap_or(80),
            url.path().trim_end_matches('/')
        );

        Self {
            id,
            url,
            alive: RwLock::new(true),
            last_health_check: RwLock::new(None),
        }
    }

    pub async fn is_alive(&self) -> bool {
        *self.alive.read().await
    }

    pub async fn set_alive(&self, alive: bool) {
        *self.alive.write().await = alive;
    }

    pub async fn mark_checked(&self) {
        *self.last_health_check.write().await = Some(Utc::now());
    }

    pub async fn last_health_check(&self) -> Option<DateTime<Utc>> {
        *self.last_health_check.read().await
    }
}
