//
// src/proxy/mod.rs
//
mod backend;
mod forward;
mod pool;
mod proxy;

pub use backend::{Backend, BackendAddress, HealthState};
pub use forward::{upstream_uri, ClientAddr, Dispatcher, X_FORWARDED_FOR};
pub use pool::BackendPool;
pub use proxy::{Proxy, ProxyError, X_FORWARDED_SERVER, X_REQUEST_ID};
