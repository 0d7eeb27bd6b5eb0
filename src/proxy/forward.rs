// ────────────────────────────────
// src/proxy/forward.rs
// Single-host request forwarding to a chosen backend
// ────────────────────────────────

use super::ProxyError;
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};
use hyper::{Body, Client, Request, Response, Uri, Version};
use hyper_tls::HttpsConnector;
use std::net::{IpAddr, SocketAddr};
use url::Url;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Peer address of the inbound connection, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// Forwards requests to whichever backend the selector picked.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let https = HttpsConnector::new();
        Self {
            client: Client::builder().build::<_, Body>(https),
        }
    }

    pub async fn forward(
        &self,
        target: &Url,
        mut req: Request<Body>,
    ) -> Result<Response<Body>, ProxyError> {
        *req.uri_mut() = upstream_uri(target, req.uri())?;
        *req.version_mut() = Version::HTTP_11;
        strip_hop_by_hop(req.headers_mut());

        if let Some(ClientAddr(peer)) = req.extensions().get::<ClientAddr>().copied() {
            append_forwarded_for(req.headers_mut(), peer.ip());
        }

        let mut response = self
            .client
            .request(req)
            .await
            .map_err(|e| ProxyError::BackendError(e.to_string()))?;

        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }
}

/// Backend scheme and authority, backend path joined with the request
/// path, and both query strings merged.
pub fn upstream_uri(target: &Url, incoming: &Uri) -> Result<Uri, ProxyError> {
    let host = target
        .host_str()
        .ok_or_else(|| ProxyError::BackendError(format!("{} has no host", target)))?;
    let authority = match target.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path = join_paths(target.path(), incoming.path());
    let target_query = target.query().filter(|q| !q.is_empty());
    let incoming_query = incoming.query().filter(|q| !q.is_empty());
    let path_and_query = match (target_query, incoming_query) {
        (Some(a), Some(b)) => format!("{}?{}&{}", path, a, b),
        (Some(q), None) | (None, Some(q)) => format!("{}?{}", path, q),
        (None, None) => path,
    };

    Uri::builder()
        .scheme(target.scheme())
        .authority(authority.as_str())
        .path_and_query(path_and_query.as_str())
        .build()
        .map_err(|e| ProxyError::BackendError(format!("invalid upstream URI: {}", e)))
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in &listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), ip)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(target: &str, incoming: &str) -> String {
        let target = Url::parse(target).unwrap();
        let incoming: Uri = incoming.parse().unwrap();
        upstream_uri(&target, &incoming).unwrap().to_string()
    }

    #[test]
    fn rewrites_to_backend_authority() {
        assert_eq!(uri("http://localhost:5001", "/"), "http://localhost:5001/");
        assert_eq!(
            uri("http://localhost:5001", "/users/7?full=1"),
            "http://localhost:5001/users/7?full=1"
        );
        assert_eq!(uri("https://api.internal", "/x"), "https://api.internal/x");
    }

    #[test]
    fn joins_base_path_and_queries() {
        assert_eq!(
            uri("http://backend:8000/api/", "/v1/items"),
            "http://backend:8000/api/v1/items"
        );
        assert_eq!(
            uri("http://backend:8000/api", "/v1"),
            "http://backend:8000/api/v1"
        );
        assert_eq!(
            uri("http://backend:8000/?key=abc", "/search?q=rust"),
            "http://backend:8000/search?key=abc&q=rust"
        );
    }

    #[test]
    fn strips_hop_by_hop_and_connection_listed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, x-session"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("accept"));
    }

    #[test]
    fn appends_client_ip_to_forwarded_for() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.1.1.1".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.1.1.1");

        append_forwarded_for(&mut headers, "192.168.0.9".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.1.1.1, 192.168.0.9");
    }
}
