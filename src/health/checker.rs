// src/health/checker.rs
use crate::config::HealthCheckSettings;
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendPool};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    Status(u16),
    Failed(String),
    TimedOut,
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Ok)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Ok => write!(f, "200 OK"),
            ProbeOutcome::Status(code) => write!(f, "HTTP {}", code),
            ProbeOutcome::Failed(reason) => write!(f, "{}", reason),
            ProbeOutcome::TimedOut => write!(f, "probe timed out"),
        }
    }
}

/// Client shared by all monitors; reqwest pools connections internally.
pub fn probe_client(settings: &HealthCheckSettings) -> Result<Client> {
    Client::builder()
        .timeout(settings.timeout)
        .build()
        .context("Failed to create health check client")
}

/// Periodically probes one backend and keeps its health flag current.
pub struct HealthMonitor {
    backend: Arc<Backend>,
    settings: HealthCheckSettings,
    client: Client,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthMonitor {
    pub fn new(
        backend: Arc<Backend>,
        settings: HealthCheckSettings,
        client: Client,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            backend,
            settings,
            client,
            metrics,
        }
    }

    /// HEAD the backend address. Only an exact 200 counts as healthy.
    pub async fn probe(&self) -> ProbeOutcome {
        let result = timeout(
            self.settings.timeout,
            self.client.head(self.backend.address.as_str()).send(),
        )
        .await;

        match result {
            Ok(Ok(response)) if response.status() == StatusCode::OK => ProbeOutcome::Ok,
            Ok(Ok(response)) => ProbeOutcome::Status(response.status().as_u16()),
            Ok(Err(e)) if e.is_timeout() => ProbeOutcome::TimedOut,
            Ok(Err(e)) => ProbeOutcome::Failed(e.to_string()),
            Err(_) => ProbeOutcome::TimedOut,
        }
    }

    /// Run one probe and record the result on the backend.
    pub async fn check_once(&self) -> bool {
        let outcome = self.probe().await;
        let healthy = outcome.is_healthy();
        let previous = self.backend.set_healthy(healthy).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_health_check(&self.backend.name, healthy, previous.healthy);
        }

        let name = &self.backend.name;
        match (previous.healthy, healthy) {
            (true, false) => warn!(backend = %name, %outcome, "{} is down", name),
            (false, false) => {
                warn!(backend = %name, %outcome, down_since = %previous.since, "{} is down", name)
            }
            (false, true) => {
                info!(backend = %name, down_since = %previous.since, "{} is back up", name)
            }
            (true, true) => debug!(backend = %name, "health check passed"),
        }

        healthy
    }

    /// Probe on every tick until `shutdown` flips to true or its sender is
    /// dropped. The first probe happens one interval after start; a probe
    /// still in flight when shutdown arrives is abandoned.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(backend = %self.backend.name, ?period, "health monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.check_once() => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!(backend = %self.backend.name, "health monitor stopped");
    }
}

/// Handle over the running monitor tasks, one per backend.
pub struct MonitorSet {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorSet {
    /// Signal every monitor to stop and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                error!("Health monitor task failed: {}", e);
            }
        }

        info!("Health monitors stopped");
    }
}

/// Start one independent monitor per backend in the pool.
pub fn spawn_monitors(
    pool: &BackendPool,
    settings: HealthCheckSettings,
    metrics: Option<Arc<MetricsCollector>>,
) -> Result<MonitorSet> {
    let client = probe_client(&settings)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tasks = pool
        .backends()
        .iter()
        .map(|backend| {
            let monitor =
                HealthMonitor::new(backend.clone(), settings, client.clone(), metrics.clone());
            tokio::spawn(monitor.run(shutdown_rx.clone()))
        })
        .collect::<Vec<_>>();

    info!(
        "Started {} health monitors with interval {:?} (timeout {:?})",
        tasks.len(),
        settings.interval,
        settings.timeout
    );

    Ok(MonitorSet { shutdown_tx, tasks })
}
