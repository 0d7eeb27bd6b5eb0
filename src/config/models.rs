// src/config/models.rs
use super::duration::parse_duration;
use crate::proxy::BackendAddress;
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub port: ListenPort,
    pub health_check_interval: String,
    #[serde(default)]
    pub health_check_timeout: Option<String>,
    pub servers: Vec<String>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Listen address as written in the config file: `":8080"`, `"8080"`,
/// `8080` or a full `"127.0.0.1:8080"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ListenPort {
    Number(u16),
    Text(String),
}

impl ListenPort {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let text = match self {
            ListenPort::Number(port) => return Ok(SocketAddr::from(([0, 0, 0, 0], *port))),
            ListenPort::Text(text) => text.trim(),
        };

        let candidate = if let Some(port) = text.strip_prefix(':') {
            format!("0.0.0.0:{port}")
        } else if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            format!("0.0.0.0:{text}")
        } else {
            text.to_string()
        };

        candidate
            .parse()
            .with_context(|| format!("Invalid listen port {:?}", text))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

/// Probe schedule shared by every health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        self.health_check_settings()?;
        ensure!(!self.servers.is_empty(), "At least one server must be configured");
        self.backend_addresses()?;
        if self.metrics.enabled {
            ensure!(
                self.metrics.path.starts_with('/'),
                "Metrics path must start with '/'"
            );
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.port.socket_addr()
    }

    pub fn health_check_interval(&self) -> Result<Duration> {
        let interval = parse_duration(&self.health_check_interval)
            .context("Invalid health check interval")?;
        ensure!(!interval.is_zero(), "Health check interval must be positive");
        Ok(interval)
    }

    /// Per-probe timeout; falls back to the interval so a hung probe never
    /// outlives its tick.
    pub fn health_check_timeout(&self) -> Result<Duration> {
        match &self.health_check_timeout {
            Some(raw) => {
                let timeout =
                    parse_duration(raw).context("Invalid health check timeout")?;
                ensure!(!timeout.is_zero(), "Health check timeout must be positive");
                Ok(timeout)
            }
            None => self.health_check_interval(),
        }
    }

    pub fn health_check_settings(&self) -> Result<HealthCheckSettings> {
        Ok(HealthCheckSettings {
            interval: self.health_check_interval()?,
            timeout: self.health_check_timeout()?,
        })
    }

    /// Backend addresses in configuration order.
    pub fn backend_addresses(&self) -> Result<Vec<BackendAddress>> {
        self.servers
            .iter()
            .map(|raw| BackendAddress::parse(raw))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(json: &str) -> Config {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_json_layout() {
        let config = config_from(
            r#"{
                "port": ":8080",
                "healthCheckInterval": "5s",
                "servers": ["http://localhost:5001", "http://localhost:5002"]
            }"#,
        );

        config.validate().unwrap();
        assert_eq!(config.listen_addr().unwrap(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.health_check_interval().unwrap(), Duration::from_secs(5));
        assert_eq!(config.health_check_timeout().unwrap(), Duration::from_secs(5));
        assert!(!config.metrics.enabled);

        let backends = config.backend_addresses().unwrap();
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].raw, "http://localhost:5001");
        assert_eq!(backends[0].url.port(), Some(5001));
        assert_eq!(backends[1].url.port(), Some(5002));
    }

    #[test]
    fn accepts_every_port_form() {
        let cases = [
            (ListenPort::Number(9000), "0.0.0.0:9000"),
            (ListenPort::Text("9000".into()), "0.0.0.0:9000"),
            (ListenPort::Text(":9000".into()), "0.0.0.0:9000"),
            (ListenPort::Text("127.0.0.1:9000".into()), "127.0.0.1:9000"),
        ];
        for (port, expected) in cases {
            assert_eq!(port.socket_addr().unwrap(), expected.parse().unwrap());
        }
        assert!(ListenPort::Text("not-a-port".into()).socket_addr().is_err());
    }

    #[test]
    fn numeric_port_deserializes() {
        let config = config_from(
            r#"{"port": 8081, "healthCheckInterval": "1s", "servers": ["http://a:1"]}"#,
        );
        assert_eq!(config.port, ListenPort::Number(8081));
    }

    #[test]
    fn explicit_timeout_overrides_interval() {
        let config = config_from(
            r#"{
                "port": "8080",
                "healthCheckInterval": "10s",
                "healthCheckTimeout": "500ms",
                "servers": ["https://backend.internal"]
            }"#,
        );
        let settings = config.health_check_settings().unwrap();
        assert_eq!(settings.interval, Duration::from_secs(10));
        assert_eq!(settings.timeout, Duration::from_millis(500));
    }

    #[test]
    fn rejects_bad_interval() {
        let config = config_from(
            r#"{"port": "8080", "healthCheckInterval": "soon", "servers": ["http://a:1"]}"#,
        );
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("Invalid health check interval"));

        let zero = config_from(
            r#"{"port": "8080", "healthCheckInterval": "0", "servers": ["http://a:1"]}"#,
        );
        assert!(zero.validate().is_err());
    }

    #[test]
    fn rejects_empty_or_malformed_servers() {
        let empty = config_from(r#"{"port": "8080", "healthCheckInterval": "1s", "servers": []}"#);
        assert!(empty.validate().is_err());

        let relative = config_from(
            r#"{"port": "8080", "healthCheckInterval": "1s", "servers": ["localhost:5001"]}"#,
        );
        assert!(relative.validate().is_err());

        let ftp = config_from(
            r#"{"port": "8080", "healthCheckInterval": "1s", "servers": ["ftp://files.local"]}"#,
        );
        assert!(ftp.validate().is_err());
    }
}
