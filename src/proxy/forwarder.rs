// ────────────────────────────────
// src/proxy/forwarder.rs
// Relays a request to one backend and hands back its response.
// ────────────────────────────────

use super::{Backend, ProxyError};
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use hyper::{Body, Client, Request, Response, Uri};
use hyper_tls::HttpsConnector;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// Address of the downstream client, attached to each request by the server.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub SocketAddr);

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        target: &Backend,
        req: Request<Body>,
    ) -> Result<Response<Body>, ProxyError>;
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// hyper client based forwarder; plain http and https upstreams.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    timeout: Option<Duration>,
}

impl HttpForwarder {
    pub fn new(timeout: Option<Duration>) -> Self {
        let client = Client::builder().build::<_, Body>(HttpsConnector::new());
        Self { client, timeout }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(
        &self,
        target: &Backend,
        mut req: Request<Body>,
    ) -> Result<Response<Body>, ProxyError> {
        let uri = upstream_uri(&target.url, req.uri())?;
        *req.uri_mut() = uri;

        let client_addr = req.extensions().get::<ClientAddr>().copied();
        prepare_headers(req.headers_mut(), client_addr);

        let call = self.client.request(req);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ProxyError::Timeout)?,
            None => call.await,
        };

        result.map_err(|e| ProxyError::BackendError(e.to_string()))
    }
}

/// Backend scheme and authority, backend base path, then the inbound path
/// and query.
pub fn upstream_uri(base: &Url, original: &Uri) -> Result<Uri, ProxyError> {
    let host = base
        .host_str()
        .ok_or_else(|| ProxyError::BackendError(format!("backend {base} has no host")))?;
    let authority = match base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let inbound = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let path_and_query = format!("{}{}", base.path().trim_end_matches('/'), inbound);

    let uri = Uri::builder()
        .scheme(base.scheme())
        .authority(authority.as_str())
        .path_and_query(path_and_query.as_str())
        .build()?;
    Ok(uri)
}

fn prepare_headers(headers: &mut HeaderMap, client_addr: Option<ClientAddr>) {
    // Headers named in Connection apply to this hop only (RFC 7230 6.1).
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    // hyper derives Host from the upstream URI when it is absent.
    headers.remove(HOST);

    let Some(ClientAddr(addr)) = client_addr else {
        return;
    };
    let ip = addr.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
