//! client_types component
//!
//! Core types for the HTTP client: Request, Response, streaming bodies,
//! timeout and pool configuration, origins, and the Transport interface.
//!
//! This component provides the fundamental data structures shared by the
//! connection pool, the middleware pipeline, and the client facade.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use client_errors::{ClientError, ClientResult};
use url::Url;

mod body;
mod request;
mod response;
mod transport;

pub use body::{ChunkStream, RequestBody};
pub use request::{Request, RequestHead};
pub use response::{Response, ResponseBody};
pub use transport::{MockResponse, MockTransport, Transport};

/// URL scheme supported by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// Cleartext HTTP
    Http,
    /// HTTP over TLS
    Https,
}

impl Scheme {
    /// The default port for this scheme (80 or 443)
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    /// The scheme as it appears in a URL
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection identity: (scheme, host, port)
///
/// Connections are never shared across origins. The host is lowercased and
/// the port is always concrete (filled from the scheme default when the URL
/// omits it).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    /// URL scheme
    pub scheme: Scheme,
    /// Lowercased host
    pub host: String,
    /// Concrete port
    pub port: u16,
}

impl Origin {
    /// Extract the origin from a URL
    ///
    /// Fails with `InvalidUrl` when the URL has no host, and with
    /// `UnsupportedScheme` for anything other than http/https.
    pub fn from_url(url: &Url) -> ClientResult<Origin> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl("missing host".to_string()))?
            .to_ascii_lowercase();
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Origin { scheme, host, port })
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Per-operation timeout configuration
///
/// Each field covers one kind of suspension point; `None` disables that
/// timeout. Timeouts are per-operation, not cumulative across a call, so a
/// redirect chain may exceed the sum of the individual values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeout {
    /// Maximum time to establish a connection
    pub connect: Option<Duration>,
    /// Maximum time per read operation
    pub read: Option<Duration>,
    /// Maximum time per write operation
    pub write: Option<Duration>,
    /// Maximum time to wait for a pool permit
    pub pool: Option<Duration>,
}

impl Timeout {
    /// A timeout configuration with every operation disabled
    pub fn none() -> Self {
        Self {
            connect: None,
            read: None,
            write: None,
            pool: None,
        }
    }

    /// The same duration for every operation
    pub fn all(duration: Duration) -> Self {
        Self {
            connect: Some(duration),
            read: Some(duration),
            write: Some(duration),
            pool: Some(duration),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::all(Duration::from_secs(5))
    }
}

/// Connection pool limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLimits {
    /// Target number of idle keep-alive connections to retain
    pub soft_limit: usize,
    /// Maximum number of simultaneously open connections
    pub hard_limit: usize,
    /// Maximum time to wait for a free connection slot
    pub pool_timeout: Option<Duration>,
    /// Duration an idle connection may be kept for reuse
    pub keepalive_expiry: Option<Duration>,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            soft_limit: 10,
            hard_limit: 100,
            pool_timeout: Some(Duration::from_secs(5)),
            keepalive_expiry: Some(Duration::from_secs(5)),
        }
    }
}

/// The request target as it appears on the request line: path plus query
pub fn request_target(url: &Url) -> String {
    let path = if url.path().is_empty() { "/" } else { url.path() };
    match url.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    }
}

/// The URL authority for the `Host` header: host, with the port appended
/// only when it differs from the scheme default
pub fn authority(url: &Url) -> ClientResult<String> {
    let origin = Origin::from_url(url)?;
    if origin.port == origin.scheme.default_port() {
        Ok(origin.host)
    } else {
        Ok(format!("{}:{}", origin.host, origin.port))
    }
}
