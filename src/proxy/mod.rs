//
// src/proxy/mod.rs
//
mod backend;
mod dispatcher;
mod forwarder;
mod pool;

pub use backend::Backend;
pub use dispatcher::{Dispatcher, ProxyError};
pub use forwarder::{upstream_uri, ClientAddr, Forwarder, HttpForwarder};
pub use pool::BackendPool;
