// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait LoadBalancer: Send + Sync {
    /// Pick the next healthy backend, or `None` when none is available.
    async fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    fn name(&self) -> &'static str;
}
