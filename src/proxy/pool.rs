//
// src/proxy/pool.rs
//

use super::backend::{Backend, BackendAddress};
use std::sync::Arc;

/// Fixed, ordered set of backends. Order is configuration order and never
/// changes, which keeps the rotation fair.
#[derive(Debug, Clone, Default)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
}

impl BackendPool {
    pub fn new(addresses: Vec<BackendAddress>) -> Self {
        let backends = addresses
            .into_iter()
            .map(|address| Arc::new(Backend::new(address)))
            .collect();

        Self { backends }
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
