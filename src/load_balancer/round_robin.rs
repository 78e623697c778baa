// src/load_balancer/round_robin.rs
use crate::proxy::Backend;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Round-robin over a fixed backend list, skipping backends that are not
/// alive. The cursor holds the index of the last visited slot.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Mutex<u64>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans at most one full cycle starting one past the cursor and
    /// returns the first live backend. The cursor advances to every slot
    /// visited, dead ones included. The lock is held for the whole scan so
    /// concurrent callers never interleave their cursor updates.
    pub async fn next_live(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let len = backends.len() as u64;
        let mut cursor = self.cursor.lock().await;

        for _ in 0..len {
            *cursor = (*cursor + 1) % len;
            let backend = &backends[*cursor as usize];
            if backend.is_alive().await {
                return Some(backend.clone());
            }
        }

        None
    }

    pub async fn cursor(&self) -> u64 {
        *self.cursor.lock().await
    }
}
