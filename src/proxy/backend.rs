// src/proxy/backend.rs
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use url::Url;

/// A backend address as written in the config, plus its parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAddress {
    pub raw: String,
    pub url: Url,
}

impl BackendAddress {
    /// Accepts absolute `http`/`https` URLs with a host.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).with_context(|| format!("Invalid server URL {:?}", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Server URL {:?} must use http or https", raw);
        }
        if url.host_str().is_none() {
            bail!("Server URL {:?} has no host", raw);
        }
        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    pub healthy: bool,
    /// When `healthy` last changed value (creation time until the first flip).
    pub since: DateTime<Utc>,
}

/// One upstream server. The address never changes; the health flag is
/// only touched under this backend's own lock.
#[derive(Debug)]
pub struct Backend {
    /// Configured address, echoed in `X-Forwarded-Server`, logs and metrics.
    pub name: String,
    pub address: Url,
    state: Mutex<HealthState>,
}

impl Backend {
    pub fn new(address: BackendAddress) -> Self {
        Self {
            name: address.raw,
            address: address.url,
            state: Mutex::new(HealthState {
                healthy: true,
                since: Utc::now(),
            }),
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.state.lock().await.healthy
    }

    /// Record a probe result and return the state it replaced.
    pub async fn set_healthy(&self, healthy: bool) -> HealthState {
        let mut state = self.state.lock().await;
        let previous = *state;
        if previous.healthy != healthy {
            *state = HealthState {
                healthy,
                since: Utc::now(),
            };
        }
        previous
    }
}
