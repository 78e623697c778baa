// src/main.rs
use anyhow::Result;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use rr_load_balancer::{
    config,
    health::{HealthMonitor, HttpProber},
    metrics::MetricsRegistry,
    proxy::{BackendPool, Dispatcher, HttpForwarder},
    server::{RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rr_load_balancer=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    // Initialize metrics
    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();

    // Backend pool, shared by the health monitor and the dispatcher
    let pool = Arc::new(BackendPool::from_configs(&config.backends));
    metrics.set_total_backends(pool.len());

    // Start health monitor
    let monitor = if config.health_check.enabled {
        let prober = Arc::new(HttpProber::new(&config.health_check)?);
        let monitor = Arc::new(HealthMonitor::new(
            pool.clone(),
            prober,
            config.health_check.interval(),
            Some(metrics.clone()),
        ));
        tokio::spawn(monitor.clone().start());
        Some(monitor)
    } else {
        warn!("Health checks disabled, backends stay alive as configured");
        None
    };

    // Start metrics server if enabled
    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, metrics_registry, config.metrics.path.clone()).await?;
    }

    // Create request handler
    let forwarder = Arc::new(HttpForwarder::new(config.proxy.timeout()));
    let dispatcher = Arc::new(Dispatcher::new(pool, forwarder, Some(metrics)));
    let handler = RequestHandler::new(dispatcher);

    // Start main server
    info!("Starting load balancer on {}", config.listen);

    ServerBuilder::new(config.listen)
        .with_handler(handler)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    if let Some(monitor) = monitor {
        monitor.shutdown();
    }

    Ok(())
}

async fn start_metrics_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    path: String,
) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    if req.uri().path() != path.as_str() {
                        return Ok::<_, Infallible>(plain(StatusCode::NOT_FOUND, "Not Found".into()));
                    }

                    let response = match registry.gather() {
                        Ok(metrics) => {
                            let mut response = plain(StatusCode::OK, Body::from(metrics));
                            response.headers_mut().insert(
                                CONTENT_TYPE,
                                HeaderValue::from_static("text/plain; version=0.0.4"),
                            );
                            response
                        }
                        Err(e) => {
                            error!("Failed to encode metrics: {}", e);
                            plain(StatusCode::INTERNAL_SERVER_ERROR, Body::empty())
                        }
                    };
                    Ok(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

fn plain(status: StatusCode, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
