// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Text exposition of everything registered.
    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub no_backend_total: IntCounter,

    // Backend metrics
    pub backend_health_status: IntGaugeVec,
    pub health_checks_total: IntCounterVec,

    // Pool metrics
    pub healthy_backends: IntGauge,
    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("lb_requests_total", "Total number of requests"),
            &["method", "status_code", "backend"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["method", "status_code", "backend"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let no_backend_total = IntCounter::new(
            "lb_no_backend_total",
            "Requests rejected because no backend was healthy",
        )?;
        registry.register(Box::new(no_backend_total.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "lb_backend_health_status",
                "Backend health status (1=healthy, 0=unhealthy)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let health_checks_total = IntCounterVec::new(
            Opts::new("lb_health_checks_total", "Health probes by outcome"),
            &["backend", "result"],
        )?;
        registry.register(Box::new(health_checks_total.clone()))?;

        let healthy_backends =
            IntGauge::new("lb_healthy_backends", "Number of healthy backends")?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let total_backends =
            IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            no_backend_total,
            backend_health_status,
            health_checks_total,
            healthy_backends,
            total_backends,
        })
    }

    pub fn record_request(
        &self,
        method: &str,
        status_code: u16,
        backend: &str,
        duration: Duration,
    ) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, &status, backend])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[method, &status, backend])
            .observe(duration.as_secs_f64());
    }

    pub fn record_no_backend(&self) {
        self.no_backend_total.inc();
    }

    /// Every backend starts healthy, so the pool gauges start full.
    pub fn init_backends<'a>(&self, backends: impl IntoIterator<Item = &'a str>) {
        let mut total = 0;
        for backend in backends {
            self.backend_health_status.with_label_values(&[backend]).set(1);
            total += 1;
        }
        self.total_backends.set(total);
        self.healthy_backends.set(total);
    }

    pub fn record_health_check(&self, backend: &str, healthy: bool, was_healthy: bool) {
        let result = if healthy { "healthy" } else { "unhealthy" };
        self.health_checks_total
            .with_label_values(&[backend, result])
            .inc();

        self.backend_health_status
            .with_label_values(&[backend])
            .set(if healthy { 1 } else { 0 });

        match (was_healthy, healthy) {
            (true, false) => self.healthy_backends.dec(),
            (false, true) => self.healthy_backends.inc(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_transitions_move_pool_gauge() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();
        metrics.init_backends(["http://a:1/", "http://b:2/"]);
        assert_eq!(metrics.healthy_backends.get(), 2);
        assert_eq!(metrics.total_backends.get(), 2);

        metrics.record_health_check("http://a:1/", false, true);
        metrics.record_health_check("http://a:1/", false, false);
        assert_eq!(metrics.healthy_backends.get(), 1);
        assert_eq!(
            metrics
                .backend_health_status
                .with_label_values(&["http://a:1/"])
                .get(),
            0
        );

        metrics.record_health_check("http://a:1/", true, false);
        assert_eq!(metrics.healthy_backends.get(), 2);
        assert_eq!(
            metrics
                .health_checks_total
                .with_label_values(&["http://a:1/", "unhealthy"])
                .get(),
            2
        );
    }

    #[test]
    fn gather_renders_text_format() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();
        metrics.record_request("GET", 200, "http://a:1/", Duration::from_millis(5));
        metrics.record_no_backend();

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains("lb_requests_total"));
        assert!(text.contains("lb_no_backend_total 1"));
    }
}
