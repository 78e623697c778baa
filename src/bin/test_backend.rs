//! src/bin/test_backend.rs
//! Run: cargo run --bin test_backend -- <port> [name]
//!
//! Start three of these on 8081, 8082 and 8083 to match `config.yaml`.

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;
use tracing::info;

#[derive(Clone)]
struct BackendState {
    port: u16,
    name: String,
    req_counter: Arc<AtomicU64>,
    healthy_flag: Arc<AtomicBool>,
    delay_ms: u64,
}

async fn handle(req: Request<Body>, state: BackendState) -> Result<Response<Body>, Infallible> {
    let n = state.req_counter.fetch_add(1, Ordering::SeqCst) + 1;

    // The balancer probes `/` by default, so an unhealthy backend fails
    // every path.
    if !state.healthy_flag.load(Ordering::SeqCst) {
        let mut response = Response::new(Body::from("Unhealthy"));
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        return Ok(response);
    }

    if state.delay_ms > 0 {
        sleep(Duration::from_millis(state.delay_ms)).await;
    }

    info!(backend = %state.name, req = n, path = %req.uri().path(), "Received request");

    Ok(Response::new(Body::from(format!(
        "Hello from backend server on port: {}\n",
        state.port
    ))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "8081".into())
        .parse()?;
    let name = std::env::args()
        .nth(2)
        .or_else(|| std::env::var("BACKEND_NAME").ok())
        .unwrap_or_else(|| format!("backend-{port}"));

    let delay_ms: u64 = std::env::var("DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    // Flip health every N seconds to watch the balancer drop and recover it.
    let flip_secs: Option<u64> = std::env::var("HEALTH_FLIP_SECS")
        .ok()
        .and_then(|v| v.parse().ok());

    let state = BackendState {
        port,
        name: name.clone(),
        req_counter: Arc::new(AtomicU64::new(0)),
        healthy_flag: Arc::new(AtomicBool::new(true)),
        delay_ms,
    };

    if let Some(secs) = flip_secs {
        let st = state.clone();
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(secs)).await;
                let was_healthy = st.healthy_flag.fetch_xor(true, Ordering::SeqCst);
                info!(backend = %st.name, healthy = !was_healthy, "Health flipped");
            }
        });
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let make_svc = make_service_fn(move |_conn| {
        let st = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, st.clone()))) }
    });

    info!(%addr, %name, delay_ms, "Starting backend server");

    Server::try_bind(&addr)?.serve(make_svc).await?;
    Ok(())
}
