//! http_client component
//!
//! The client facade: holds defaults (headers, cookies, params, timeout,
//! base URL, proxies, redirect limit), merges per-call overrides, selects
//! a transport for each request URL, and drives the middleware pipeline
//! to completion.
//!
//! ```no_run
//! use http_client::Client;
//!
//! # async fn example() -> client_errors::ClientResult<()> {
//! let client = Client::builder().build()?;
//! let response = client.get("http://example.org/").send().await?;
//! println!("{}", response.text()?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod builder;
mod client;
mod env;
mod hsts;

pub mod blocking;

pub use builder::{ClientBuilder, ProxiesConfig, Verify};
pub use client::{Client, RequestBuilder};
pub use env::{environment_proxies, no_proxy_hosts, Netrc};
pub use hsts::HstsPreload;

// The commonly-needed vocabulary, re-exported so callers rarely import
// the component crates directly.
pub use auth_flows::Credentials;
pub use client_errors::{ClientError, ClientResult};
pub use client_types::{
    MockResponse, MockTransport, PoolLimits, Request, RequestBody, Response, Timeout, Transport,
};
pub use proxy_transport::{Proxy, ProxyMode};
