//! Blocking facade
//!
//! A thin synchronous wrapper owning a current-thread runtime. The async
//! client does all the work; this module only parks the calling thread.

use client_errors::{ClientError, ClientResult};
use client_types::{Request, RequestBody, Response};
use http::Method;

use crate::ClientBuilder;

/// A synchronous HTTP client
///
/// Every call blocks the current thread until the response body has been
/// fully read.
pub struct Client {
    inner: crate::Client,
    runtime: tokio::runtime::Runtime,
}

impl Client {
    /// Build a blocking client from a configured builder
    pub fn new(builder: ClientBuilder) -> ClientResult<Client> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| ClientError::Network(format!("runtime setup failed: {}", error)))?;
        Ok(Client {
            inner: builder.build()?,
            runtime,
        })
    }

    /// A blocking client with all defaults
    pub fn default_client() -> ClientResult<Client> {
        Self::new(crate::Client::builder())
    }

    /// Perform a GET request
    pub fn get(&self, url: &str) -> ClientResult<Response> {
        self.runtime.block_on(self.inner.get(url).send())
    }

    /// Perform a HEAD request
    pub fn head(&self, url: &str) -> ClientResult<Response> {
        self.runtime.block_on(self.inner.head(url).send())
    }

    /// Perform a POST request with a body
    pub fn post(&self, url: &str, body: impl Into<RequestBody>) -> ClientResult<Response> {
        self.runtime.block_on(self.inner.post(url).body(body).send())
    }

    /// Perform a request with an arbitrary method
    pub fn request(&self, method: Method, url: &str) -> ClientResult<Response> {
        self.runtime.block_on(self.inner.request(method, url).send())
    }

    /// Send a prepared request
    pub fn send(&self, request: Request) -> ClientResult<Response> {
        self.runtime.block_on(self.inner.send(request))
    }

    /// Close the client, tearing down every owned transport
    pub fn close(&self) {
        self.runtime.block_on(self.inner.close());
    }
}
