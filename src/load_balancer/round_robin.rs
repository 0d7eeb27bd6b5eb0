// src/load_balancer/round_robin.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Round-robin over healthy backends.
///
/// The cursor lock is held for a whole selection so concurrent callers
/// never share a rotation slot. Backend locks are taken one at a time
/// inside it, only to read the health flag. Every attempt advances the
/// cursor by one, healthy or not.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    cursor: Mutex<usize>,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(cursor: usize) -> Self {
        Self {
            cursor: Mutex::new(cursor),
        }
    }

    pub async fn cursor(&self) -> usize {
        *self.cursor.lock().await
    }
}

#[async_trait]
impl LoadBalancer for RoundRobinBalancer {
    async fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let mut cursor = self.cursor.lock().await;
        for _ in 0..backends.len() {
            let index = *cursor % backends.len();
            *cursor = cursor.wrapping_add(1);

            let candidate = &backends[index];
            if candidate.is_healthy().await {
                return Some(candidate.clone());
            }
        }

        None
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
