// ────────────────────────────────
// src/proxy/proxy.rs
// Proxy component that picks a backend and hands the request over
// ────────────────────────────────

use super::{Backend, BackendPool, Dispatcher};
use crate::load_balancer::LoadBalancer;
use crate::metrics::MetricsCollector;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Response header carrying the configured address of the chosen backend.
pub const X_FORWARDED_SERVER: HeaderName = HeaderName::from_static("x-forwarded-server");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub struct Proxy {
    pool: Arc<BackendPool>,
    balancer: Arc<dyn LoadBalancer>,
    dispatcher: Dispatcher,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Proxy {
    pub fn new(
        pool: Arc<BackendPool>,
        balancer: Arc<dyn LoadBalancer>,
        dispatcher: Dispatcher,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            pool,
            balancer,
            dispatcher,
            metrics,
        }
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    /// Next healthy backend in rotation.
    pub async fn select(&self) -> Result<Arc<Backend>, ProxyError> {
        self.balancer
            .select_backend(self.pool.backends())
            .await
            .ok_or(ProxyError::NoHealthyBackends)
    }

    /// Select a backend and forward `req` to it.
    ///
    /// Only an empty rotation is reported as an error. A failed forward
    /// becomes a 502 response and leaves the backend's health untouched.
    pub async fn handle(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let request_id = req
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = tracing::info_span!(
            "request",
            %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        self.dispatch(req, request_id).instrument(span).await
    }

    async fn dispatch(
        &self,
        mut req: Request<Body>,
        request_id: String,
    ) -> Result<Response<Body>, ProxyError> {
        let start = Instant::now();
        let method = req.method().to_string();

        let backend = match self.select().await {
            Ok(backend) => backend,
            Err(err) => {
                warn!("No healthy server available");
                if let Some(metrics) = &self.metrics {
                    metrics.record_no_backend();
                    metrics.record_request(
                        &method,
                        StatusCode::SERVICE_UNAVAILABLE.as_u16(),
                        "none",
                        start.elapsed(),
                    );
                }
                return Err(err);
            }
        };

        debug!(backend = %backend.name, balancer = self.balancer.name(), "selected backend");

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            req.headers_mut().insert(X_REQUEST_ID, value);
        }

        let mut response = match self.dispatcher.forward(&backend.address, req).await {
            Ok(response) => response,
            Err(err) => {
                warn!(backend = %backend.name, %err, "forward failed");
                err.into()
            }
        };

        if let Ok(value) = HeaderValue::from_str(&backend.name) {
            response.headers_mut().append(X_FORWARDED_SERVER, value);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_request(
                &method,
                response.status().as_u16(),
                &backend.name,
                start.elapsed(),
            );
        }

        Ok(response)
    }
}

// Custom error type for proxy operations
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy server available")]
    NoHealthyBackends,

    #[error("Backend error: {0}")]
    BackendError(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoHealthyBackends => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::BackendError(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

// Convert ProxyError to Hyper Response for error handling
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let status = err.status();
        let message = match err {
            ProxyError::NoHealthyBackends => "No healthy server available\n",
            ProxyError::BackendError(_) => "Bad gateway\n",
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
