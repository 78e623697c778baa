// src/health/monitor.rs
use super::Prober;
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Probes every backend in the pool and writes the outcome into its
/// liveness flag. Shares nothing with request dispatch except those flags.
pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    prober: Arc<dyn Prober>,
    interval: Duration,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl HealthMonitor {
    pub fn new(
        pool: Arc<BackendPool>,
        prober: Arc<dyn Prober>,
        interval: Duration,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Self {
            pool,
            prober,
            interval,
            metrics,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Periodic loop. Each tick dispatches a round and moves on without
    /// waiting for the probes, so a slow backend never delays the next tick.
    pub async fn start(self: Arc<Self>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            interval = ?self.interval,
            backends = self.pool.len(),
            "Starting health monitor"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Dropping the handles detaches the probes.
                    drop(self.run_health_check());
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Spawns one probe task per backend and returns as soon as they are
    /// all spawned. Awaiting the returned handles is optional; each resolves
    /// to the liveness that probe recorded.
    pub fn run_health_check(&self) -> Vec<JoinHandle<bool>> {
        self.pool
            .all_backends()
            .iter()
            .map(|backend| {
                let backend = backend.clone();
                let pool = self.pool.clone();
                let prober = self.prober.clone();
                let metrics = self.metrics.clone();
                tokio::spawn(async move {
                    check_backend(prober.as_ref(), &pool, &backend, metrics.as_deref()).await
                })
            })
            .collect()
    }
}

async fn check_backend(
    prober: &dyn Prober,
    pool: &BackendPool,
    backend: &Backend,
    metrics: Option<&MetricsCollector>,
) -> bool {
    let was_alive = backend.is_alive().await;

    let healthy = match prober.probe(backend).await {
        Ok(()) => true,
        Err(e) => {
            debug!(backend = %backend.id, error = %e, "Health probe failed");
            false
        }
    };

    backend.set_alive(healthy).await;
    backend.mark_checked().await;

    if let Some(metrics) = metrics {
        metrics.record_health_check(&backend.id, healthy);
        if let Some(at) = backend.last_health_check().await {
            metrics.record_last_check(&backend.id, at);
        }
        metrics.set_live_backends(pool.live_count().await);
    }

    match (was_alive, healthy) {
        (false, true) => info!(backend = %backend.id, "Backend recovered"),
        (true, false) => warn!(backend = %backend.id, "Backend is down"),
        _ => debug!(backend = %backend.id, alive = healthy, "Backend status unchanged"),
    }

    healthy
}
