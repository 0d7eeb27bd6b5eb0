// src/health/mod.rs
mod checker;

pub use checker::{probe_client, spawn_monitors, HealthMonitor, MonitorSet, ProbeOutcome};
