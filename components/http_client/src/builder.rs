//! Client construction
//!
//! `ClientBuilder` collects defaults and assembles the transports: the
//! direct connection pool (or a Unix-socket pool, or a caller-supplied
//! transport) plus one proxy transport per configured proxy key.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use auth_flows::Credentials;
use client_cookies::SharedCookieJar;
use client_errors::ClientResult;
use client_types::{PoolLimits, Timeout, Transport};
use connection_pool::ConnectionPool;
use http::HeaderMap;
use proxy_transport::{Proxy, ProxyTransport};
use url::Url;

use crate::client::Client;
use crate::env::{environment_proxies, no_proxy_hosts, Netrc};
use crate::hsts::HstsPreload;

/// TLS peer verification policy, carried to the connector boundary
#[derive(Debug, Clone, Default)]
pub enum Verify {
    /// Verify against the default CA bundle
    #[default]
    Enabled,
    /// Verify against the CA bundle at this path
    CaBundle(PathBuf),
    /// Disable verification
    Disabled,
}

/// Proxy configuration: one proxy for everything, or a keyed map
#[derive(Debug, Clone)]
pub enum ProxiesConfig {
    /// A single proxy for every request (key `all`)
    Single(Proxy),
    /// Proxies keyed by URL pattern (`scheme://host:port`, `scheme`,
    /// `all://host`, `all`, ...)
    Map(HashMap<String, Proxy>),
}

/// Builder for [`Client`]
#[derive(Default)]
pub struct ClientBuilder {
    auth: Option<Credentials>,
    params: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    verify: Verify,
    cert: Option<PathBuf>,
    proxies: Option<ProxiesConfig>,
    timeout: Option<Timeout>,
    pool_limits: Option<PoolLimits>,
    max_redirects: Option<usize>,
    base_url: Option<Url>,
    trust_env: Option<bool>,
    http2: bool,
    uds: Option<PathBuf>,
    transport: Option<Arc<dyn Transport>>,
    hsts: Option<HstsPreload>,
}

impl ClientBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default credentials for every call
    pub fn auth(mut self, credentials: Credentials) -> Self {
        self.auth = Some(credentials);
        self
    }

    /// A query parameter appended to every request URL
    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    /// Default headers sent with every request
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// A cookie present in the jar from the start
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    /// TLS verification policy
    pub fn verify(mut self, verify: Verify) -> Self {
        self.verify = verify;
        self
    }

    /// Client certificate presented to servers that request one
    pub fn cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert = Some(path.into());
        self
    }

    /// Route requests through proxies
    pub fn proxies(mut self, proxies: ProxiesConfig) -> Self {
        self.proxies = Some(proxies);
        self
    }

    /// Default timeout configuration
    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Connection pool limits
    pub fn pool_limits(mut self, limits: PoolLimits) -> Self {
        self.pool_limits = Some(limits);
        self
    }

    /// Maximum redirect hops per call
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    /// Base URL request URLs are joined against
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Whether environment variables (proxies, netrc) are consulted
    pub fn trust_env(mut self, trust_env: bool) -> Self {
        self.trust_env = Some(trust_env);
        self
    }

    /// Ask for HTTP/2 where the transport can negotiate it
    ///
    /// The bundled pool speaks HTTP/1.1; the flag is recorded for
    /// transports that support negotiation.
    pub fn http2(mut self, http2: bool) -> Self {
        self.http2 = http2;
        self
    }

    /// Connect through a Unix domain socket instead of TCP
    #[cfg(unix)]
    pub fn uds(mut self, path: impl Into<PathBuf>) -> Self {
        self.uds = Some(path.into());
        self
    }

    /// Replace the transport entirely (in-process apps, tests)
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Override the HSTS preload list
    pub fn hsts_preload(mut self, hsts: HstsPreload) -> Self {
        self.hsts = Some(hsts);
        self
    }

    /// Assemble the client
    pub fn build(self) -> ClientResult<Client> {
        let trust_env = self.trust_env.unwrap_or(true);
        let pool_limits = self.pool_limits.unwrap_or_default();

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => match &self.uds {
                #[cfg(unix)]
                Some(path) => Arc::new(ConnectionPool::with_connector(
                    pool_limits.clone(),
                    connection_pool::UnixConnector::new(path.clone()),
                )),
                #[cfg(not(unix))]
                Some(_) => {
                    return Err(client_errors::ClientError::NotImplemented(
                        "Unix domain sockets are not available on this platform".to_string(),
                    ))
                }
                None => Arc::new(ConnectionPool::new(pool_limits.clone())),
            },
        };

        let configured: HashMap<String, Proxy> = match self.proxies {
            Some(ProxiesConfig::Single(proxy)) => {
                HashMap::from([("all".to_string(), proxy)])
            }
            Some(ProxiesConfig::Map(map)) => map,
            None if trust_env => environment_proxies()
                .into_iter()
                .map(|(key, url)| (key, Proxy::new(url)))
                .collect(),
            None => HashMap::new(),
        };
        let mut proxy_map: HashMap<String, Arc<dyn Transport>> = HashMap::new();
        for (key, proxy) in configured {
            proxy_map.insert(
                key,
                Arc::new(ProxyTransport::new(proxy, pool_limits.clone())?),
            );
        }

        let cookies = SharedCookieJar::new();
        for (name, value) in &self.cookies {
            cookies.set(name, value, "", "/");
        }

        let netrc = if trust_env {
            Netrc::from_env().filter(|netrc| !netrc.is_empty())
        } else {
            None
        };
        let no_proxy = if trust_env { no_proxy_hosts() } else { Vec::new() };

        Ok(Client::assemble(
            self.auth,
            self.params,
            self.headers,
            cookies,
            self.verify,
            self.cert,
            self.timeout.unwrap_or_default(),
            self.max_redirects.unwrap_or(20),
            self.base_url,
            trust_env,
            self.http2,
            self.hsts.unwrap_or_else(HstsPreload::builtin),
            transport,
            proxy_map,
            no_proxy,
            netrc,
        ))
    }
}
