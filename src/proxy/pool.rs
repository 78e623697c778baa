//
// src/proxy/pool.rs
//

use super::backend::Backend;
use crate::config::BackendConfig;
use crate::load_balancer::RoundRobin;
use std::sync::Arc;

/// Ordered set of backends plus the rotation state used to pick among them.
///
/// Membership is fixed once the pool is shared: `add_server` takes
/// `&mut self`, so it can only run before the pool is wrapped in an `Arc`
/// and handed to the dispatcher and health monitor.
#[derive(Debug, Default)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    balancer: RoundRobin,
}

impl BackendPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[BackendConfig]) -> Self {
        let mut pool = Self::new();
        for config in configs {
            pool.add_server(Backend::new(config.url.clone()));
        }
        pool
    }

    pub fn add_server(&mut self, backend: Backend) -> Arc<Backend> {
        let backend = Arc::new(backend);
        tracing::info!(backend = %backend.id, url = %backend.url, "Configured backend");
        self.backends.push(backend.clone());
        backend
    }

    /// Next live backend in round-robin order, or `None` when nothing is alive.
    pub async fn get_next_peer(&self) -> Option<Arc<Backend>> {
        self.balancer.next_live(&self.backends).await
    }

    pub fn all_backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub async fn live_count(&self) -> usize {
        let mut count = 0;
        for backend in &self.backends {
            if backend.is_alive().await {
                count += 1;
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
