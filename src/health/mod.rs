// src/health/mod.rs
mod monitor;
mod prober;

pub use monitor::HealthMonitor;
pub use prober::{probe_url, HttpProber, ProbeError, Prober};
