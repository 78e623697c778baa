// src/metrics/collector.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,

    // Backend metrics
    pub backend_health_status: IntGaugeVec,
    pub health_checks_total: IntCounterVec,
    pub backend_last_check_seconds: IntGaugeVec,
    pub live_backends: IntGauge,
    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("lb_requests_total", "Total number of requests"),
            &["method", "status_code", "backend"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["method", "status_code", "backend"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "lb_backend_health_status",
                "Backend health status (1=alive, 0=dead)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let health_checks_total = IntCounterVec::new(
            Opts::new("lb_health_checks_total", "Health probes by outcome"),
            &["backend", "result"],
        )?;
        registry.register(Box::new(health_checks_total.clone()))?;

        let backend_last_check_seconds = IntGaugeVec::new(
            Opts::new(
                "lb_backend_last_check_timestamp_seconds",
                "Unix time of the last completed health probe",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_last_check_seconds.clone()))?;

        let live_backends = IntGauge::new("lb_live_backends", "Backends currently marked alive")?;
        registry.register(Box::new(live_backends.clone()))?;

        let total_backends = IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            backend_health_status,
            health_checks_total,
            backend_last_check_seconds,
            live_backends,
            total_backends,
        })
    }

    pub fn record_request(&self, method: &str, status_code: u16, backend: &str, duration: Duration) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, &status, backend])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[method, &status, backend])
            .observe(duration.as_secs_f64());
    }

    pub fn record_health_check(&self, backend: &str, healthy: bool) {
        let result = if healthy { "success" } else { "failure" };
        self.health_checks_total
            .with_label_values(&[backend, result])
            .inc();
        self.backend_health_status
            .with_label_values(&[backend])
            .set(i64::from(healthy));
    }

    pub fn record_last_check(&self, backend: &str, at: DateTime<Utc>) {
        self.backend_last_check_seconds
            .with_label_values(&[backend])
            .set(at.timestamp());
    }

    pub fn set_live_backends(&self, live: usize) {
        self.live_backends.set(live as i64);
    }

    pub fn set_total_backends(&self, total: usize) {
        self.total_backends.set(total as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(registry: &MetricsRegistry) -> String {
        String::from_utf8(registry.gather().unwrap()).unwrap()
    }

    #[test]
    fn records_requests_by_backend() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        metrics.record_request("GET", 200, "127.0.0.1:8081", Duration::from_millis(5));
        metrics.record_request("GET", 503, "none", Duration::from_millis(1));

        let text = render(&registry);
        assert!(text.contains(
            r#"lb_requests_total{backend="127.0.0.1:8081",method="GET",status_code="200"} 1"#
        ));
        assert!(text.contains(r#"lb_requests_total{backend="none",method="GET",status_code="503"} 1"#));
    }

    #[test]
    fn health_gauge_follows_latest_probe() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        metrics.record_health_check("b1", true);
        metrics.record_health_check("b1", false);
        metrics.set_total_backends(3);
        metrics.set_live_backends(2);
        metrics.record_last_check("b1", DateTime::from_timestamp(1_700_000_000, 0).unwrap());

        let text = render(&registry);
        assert!(text.contains(r#"lb_backend_health_status{backend="b1"} 0"#));
        assert!(text.contains(r#"lb_health_checks_total{backend="b1",result="failure"} 1"#));
        assert!(text.contains("lb_total_backends 3"));
        assert!(text.contains("lb_live_backends 2"));
        assert!(text.contains(r#"lb_backend_last_check_timestamp_seconds{backend="b1"} 1700000000"#));
    }
}
