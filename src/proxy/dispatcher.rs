// ────────────────────────────────
// src/proxy/dispatcher.rs
// Picks a live backend for each inbound request and forwards it
// ────────────────────────────────

use super::{BackendPool, Forwarder};
use crate::metrics::MetricsCollector;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct Dispatcher {
    pool: Arc<BackendPool>,
    forwarder: Arc<dyn Forwarder>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<BackendPool>,
        forwarder: Arc<dyn Forwarder>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            pool,
            forwarder,
            metrics,
        }
    }

    /// Forward `req` to the next live backend. A forward failure is returned
    /// as is: no retry against another backend and no change to liveness.
    pub async fn dispatch(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let request_id = Uuid::new_v4();
        let method = req.method().clone();
        let start = Instant::now();

        let Some(backend) = self.pool.get_next_peer().await else {
            warn!(%request_id, %method, path = %req.uri().path(), "No live backend for request");
            if let Some(metrics) = &self.metrics {
                metrics.record_request(
                    method.as_str(),
                    StatusCode::SERVICE_UNAVAILABLE.as_u16(),
                    "none",
                    start.elapsed(),
                );
            }
            return Err(ProxyError::NoHealthyBackends);
        };

        debug!(%request_id, %method, path = %req.uri().path(), backend = %backend.id, "Forwarding request");

        let result = self.forwarder.forward(&backend, req).await;

        let status = match &result {
            Ok(response) => response.status(),
            Err(e) => e.status_code(),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_request(method.as_str(), status.as_u16(), &backend.id, start.elapsed());
        }

        match &result {
            Ok(_) => debug!(%request_id, backend = %backend.id, status = status.as_u16(), "Upstream responded"),
            Err(e) => warn!(%request_id, backend = %backend.id, error = %e, "Forwarding failed"),
        }

        result
    }

    /// Like `dispatch`, with errors turned into their plain-text responses.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        self.dispatch(req).await.unwrap_or_else(Into::into)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Failed to build upstream request: {0}")]
    Request(#[from] hyper::http::Error),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NoHealthyBackends => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::BackendError(_) | ProxyError::Request(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let message = match err {
            ProxyError::NoHealthyBackends => "Service not available",
            ProxyError::BackendError(_) | ProxyError::Request(_) => "Bad gateway",
            ProxyError::Timeout => "Gateway timeout",
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = err.status_code();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Backend;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use url::Url;

    /// Records every target it is asked to forward to.
    #[derive(Default)]
    struct RecordingForwarder {
        targets: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        async fn forward(
            &self,
            target: &Backend,
            req: Request<Body>,
        ) -> Result<Response<Body>, ProxyError> {
            self.targets.lock().unwrap().push(target.id.clone());
            if self.fail {
                return Err(ProxyError::BackendError("connection refused".into()));
            }
            let body = format!("{} {}", target.id, req.uri().path());
            Ok(Response::builder()
                .status(StatusCode::ACCEPTED)
                .header("x-upstream", target.id.as_str())
                .body(Body::from(body))
                .unwrap())
        }
    }

    fn pool_of(ports: &[u16]) -> Arc<BackendPool> {
        let mut pool = BackendPool::new();
        for port in ports {
            let url = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
            pool.add_server(Backend::new(url));
        }
        Arc::new(pool)
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn empty_pool_yields_503_without_forwarding() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let dispatcher = Dispatcher::new(pool_of(&[]), forwarder.clone(), None);

        let response = dispatcher.handle(request("/")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_string(response).await, "Service not available");
        assert!(forwarder.targets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_dead_yields_503_without_forwarding() {
        let pool = pool_of(&[8081, 8082]);
        for backend in pool.all_backends() {
            backend.set_alive(false).await;
        }
        let forwarder = Arc::new(RecordingForwarder::default());
        let dispatcher = Dispatcher::new(pool, forwarder.clone(), None);

        let err = dispatcher.dispatch(request("/x")).await.unwrap_err();

        assert!(matches!(err, ProxyError::NoHealthyBackends));
        assert!(forwarder.targets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn relays_upstream_response_verbatim() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let dispatcher = Dispatcher::new(pool_of(&[8081]), forwarder, None);

        let response = dispatcher.handle(request("/hello")).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-upstream"], "127.0.0.1:8081");
        assert_eq!(body_string(response).await, "127.0.0.1:8081 /hello");
    }

    #[tokio::test]
    async fn rotates_across_live_backends() {
        let pool = pool_of(&[8081, 8082, 8083]);
        pool.all_backends()[0].set_alive(false).await;
        let forwarder = Arc::new(RecordingForwarder::default());
        let dispatcher = Dispatcher::new(pool, forwarder.clone(), None);

        for _ in 0..4 {
            dispatcher.handle(request("/")).await;
        }

        let targets = forwarder.targets.lock().unwrap().clone();
        assert_eq!(
            targets,
            [
                "127.0.0.1:8082",
                "127.0.0.1:8083",
                "127.0.0.1:8082",
                "127.0.0.1:8083"
            ]
        );
    }

    #[tokio::test]
    async fn forward_failure_is_not_retried_and_leaves_liveness_alone() {
        let pool = pool_of(&[8081, 8082]);
        let forwarder = Arc::new(RecordingForwarder {
            fail: true,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(pool.clone(), forwarder.clone(), None);

        let response = dispatcher.handle(request("/")).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(forwarder.targets.lock().unwrap().len(), 1);
        assert_eq!(pool.live_count().await, 2);
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ProxyError::NoHealthyBackends.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::BackendError("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ProxyError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
