//! The client facade and per-call request builder

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use auth_flows::Credentials;
use client_cookies::SharedCookieJar;
use client_errors::{ClientError, ClientResult};
use client_middleware::{build_stack, Context};
use client_types::{Origin, Request, RequestBody, Response, Timeout, Transport};
use http::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tracing::debug;
use url::Url;

use crate::builder::{ClientBuilder, Verify};
use crate::env::Netrc;
use crate::hsts::HstsPreload;

const DEFAULT_USER_AGENT: &str = concat!("http-client/", env!("CARGO_PKG_VERSION"));

/// An HTTP client with connection pooling, redirects, auth flows, and
/// cookie persistence
///
/// Clients are cheap to share behind an `Arc`; every per-call override
/// goes through [`RequestBuilder`].
pub struct Client {
    pub(crate) auth: Option<Credentials>,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) cookies: SharedCookieJar,
    pub(crate) verify: Verify,
    pub(crate) cert: Option<PathBuf>,
    pub(crate) timeout: Timeout,
    pub(crate) max_redirects: usize,
    pub(crate) base_url: Option<Url>,
    pub(crate) trust_env: bool,
    pub(crate) http2: bool,
    pub(crate) hsts: HstsPreload,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) proxy_map: HashMap<String, Arc<dyn Transport>>,
    pub(crate) no_proxy: Vec<String>,
    pub(crate) netrc: Option<Netrc>,
}

impl Client {
    /// A client with all defaults
    pub fn new() -> ClientResult<Client> {
        Self::builder().build()
    }

    /// Start configuring a client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Assemble a client from already-resolved builder state
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        auth: Option<Credentials>,
        params: Vec<(String, String)>,
        default_headers: HeaderMap,
        cookies: SharedCookieJar,
        verify: Verify,
        cert: Option<PathBuf>,
        timeout: Timeout,
        max_redirects: usize,
        base_url: Option<Url>,
        trust_env: bool,
        http2: bool,
        hsts: HstsPreload,
        transport: Arc<dyn Transport>,
        proxy_map: HashMap<String, Arc<dyn Transport>>,
        no_proxy: Vec<String>,
        netrc: Option<Netrc>,
    ) -> Client {
        Client {
            auth,
            params,
            default_headers,
            cookies,
            verify,
            cert,
            timeout,
            max_redirects,
            base_url,
            trust_env,
            http2,
            hsts,
            transport,
            proxy_map,
            no_proxy,
            netrc,
        }
    }

    /// Begin a request with an arbitrary method
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            method,
            url: url.to_string(),
            params: Vec::new(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: RequestBody::empty(),
            auth: None,
            allow_redirects: None,
            timeout: None,
            error: None,
        }
    }

    /// Begin a GET request
    pub fn get(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::GET, url)
    }

    /// Begin a HEAD request (redirects are not followed by default)
    pub fn head(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::HEAD, url)
    }

    /// Begin an OPTIONS request
    pub fn options(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::OPTIONS, url)
    }

    /// Begin a POST request
    pub fn post(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::POST, url)
    }

    /// Begin a PUT request
    pub fn put(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::PUT, url)
    }

    /// Begin a PATCH request
    pub fn patch(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::PATCH, url)
    }

    /// Begin a DELETE request
    pub fn delete(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::DELETE, url)
    }

    /// Send a prepared request with the client defaults
    ///
    /// The response body is fully read before returning; use
    /// [`RequestBuilder::stream`] for lazy bodies.
    pub async fn send(&self, request: Request) -> ClientResult<Response> {
        let allow_redirects = request.method != Method::HEAD;
        self.perform(request, None, allow_redirects, &self.timeout, false)
            .await
    }

    /// The client's cookie jar
    pub fn cookies(&self) -> &SharedCookieJar {
        &self.cookies
    }

    /// The TLS verification policy this client was built with
    pub fn verify(&self) -> &Verify {
        &self.verify
    }

    /// The client certificate path, when configured
    pub fn cert(&self) -> Option<&PathBuf> {
        self.cert.as_ref()
    }

    /// Whether HTTP/2 negotiation was requested
    pub fn http2(&self) -> bool {
        self.http2
    }

    /// Close the client, tearing down every owned transport
    pub async fn close(&self) {
        self.transport.close().await;
        for proxy in self.proxy_map.values() {
            proxy.close().await;
        }
    }

    /// Merge a URL argument with the base URL, client params, and the
    /// HSTS preload list
    fn merge_url(&self, url: &str, call_params: &[(String, String)]) -> ClientResult<Url> {
        let mut url = match &self.base_url {
            Some(base) => base.join(url),
            None => Url::parse(url),
        }
        .map_err(|error| ClientError::InvalidUrl(error.to_string()))?;

        if !self.params.is_empty() || !call_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in self.params.iter().chain(call_params.iter()) {
                pairs.append_pair(name, value);
            }
        }

        let preloaded = url
            .host_str()
            .map(|host| self.hsts.contains(host))
            .unwrap_or(false);
        if url.scheme() == "http" && preloaded {
            let port = url.port();
            url.set_scheme("https")
                .map_err(|_| ClientError::InvalidUrl("cannot upgrade to https".to_string()))?;
            if port == Some(80) {
                url.set_port(None)
                    .map_err(|_| ClientError::InvalidUrl("cannot clear port".to_string()))?;
            }
        }
        Ok(url)
    }

    /// Build a prepared request from per-call arguments
    pub(crate) fn build_request(
        &self,
        method: Method,
        url: &str,
        call_params: &[(String, String)],
        call_headers: &HeaderMap,
        call_cookies: &[(String, String)],
        body: RequestBody,
    ) -> ClientResult<Request> {
        let url = self.merge_url(url, call_params)?;
        let mut request = Request::with_body(method, url, body)?;

        // Client defaults first, per-call headers override.
        let mut merged = self.default_headers.clone();
        for (name, value) in call_headers {
            merged.insert(name.clone(), value.clone());
        }
        for (name, value) in merged.iter() {
            request.headers.append(name.clone(), value.clone());
        }
        request.prepare()?;

        if !request.headers.contains_key(ACCEPT) {
            request.headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        }
        if !request.headers.contains_key(ACCEPT_ENCODING) {
            request
                .headers
                .insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        }
        if !request.headers.contains_key(CONNECTION) {
            request
                .headers
                .insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
        if !request.headers.contains_key(USER_AGENT) {
            request
                .headers
                .insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }

        if call_cookies.is_empty() {
            self.cookies
                .apply_to_request(&request.url, &mut request.headers);
        } else {
            let rendered = call_cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            request.headers.insert(
                COOKIE,
                HeaderValue::from_str(&rendered).map_err(|_| {
                    ClientError::InvalidUrl("cookie value is not header-safe".to_string())
                })?,
            );
        }

        Ok(request)
    }

    /// The transport serving a URL: a matching proxy, or the direct pool
    fn transport_for_url(&self, url: &Url) -> Arc<dyn Transport> {
        if !self.proxy_map.is_empty() && !self.is_no_proxy(url) {
            if let Ok(origin) = Origin::from_url(url) {
                for key in proxy_keys(&origin) {
                    if let Some(transport) = self.proxy_map.get(&key) {
                        return transport.clone();
                    }
                }
            }
        }
        self.transport.clone()
    }

    fn is_no_proxy(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.no_proxy.iter().any(|entry| {
            entry == "*" || host == *entry || host.ends_with(&format!(".{}", entry))
        })
    }

    pub(crate) async fn perform(
        &self,
        request: Request,
        auth: Option<Credentials>,
        allow_redirects: bool,
        timeout: &Timeout,
        stream: bool,
    ) -> ClientResult<Response> {
        match request.url.scheme() {
            "http" | "https" => {}
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        }

        let transport = self.transport_for_url(&request.url);
        let effective_auth = auth.or_else(|| self.auth.clone());
        let netrc_credentials = if self.trust_env
            && effective_auth.is_none()
            && request.url.username().is_empty()
        {
            self.netrc.as_ref().and_then(|netrc| {
                Origin::from_url(&request.url)
                    .ok()
                    .and_then(|origin| netrc.lookup(&origin.host, origin.port))
            })
        } else {
            None
        };

        let context = Context {
            allow_redirects,
            auth: effective_auth,
            cookies: self.cookies.clone(),
            trust_env: self.trust_env,
        };
        let stack = build_stack(&context, &request.url, self.max_redirects, netrc_credentials);

        debug!(method = %request.method, url = %request.url, "dispatching request");
        let mut response = stack.drive(transport.as_ref(), request, timeout).await?;

        if !stream {
            let read = response.read().await;
            response.close();
            read?;
        }
        Ok(response)
    }
}

/// Proxy lookup keys for an origin, most specific first
fn proxy_keys(origin: &Origin) -> Vec<String> {
    let is_default_port = origin.port == origin.scheme.default_port();
    let hostport = format!("{}:{}", origin.host, origin.port);
    let mut keys = vec![format!("{}://{}", origin.scheme, hostport)];
    if is_default_port {
        keys.push(format!("{}://{}", origin.scheme, origin.host));
    }
    keys.push(format!("all://{}", hostport));
    if is_default_port {
        keys.push(format!("all://{}", origin.host));
    }
    keys.push(origin.scheme.to_string());
    keys.push("all".to_string());
    keys
}

/// A request under construction, with per-call overrides
pub struct RequestBuilder<'a> {
    client: &'a Client,
    method: Method,
    url: String,
    params: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    body: RequestBody,
    auth: Option<Credentials>,
    allow_redirects: Option<bool>,
    timeout: Option<Timeout>,
    error: Option<ClientError>,
}

impl<'a> RequestBuilder<'a> {
    /// Append a query parameter
    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    /// Set a header, overriding any client default of the same name
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => {
                self.error = Some(ClientError::Protocol(format!(
                    "invalid header '{}'",
                    name
                )));
            }
        }
        self
    }

    /// Attach a cookie for this call only
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the request body
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Override the credentials for this call
    pub fn auth(mut self, credentials: Credentials) -> Self {
        self.auth = Some(credentials);
        self
    }

    /// Override redirect following for this call
    pub fn allow_redirects(mut self, allow_redirects: bool) -> Self {
        self.allow_redirects = Some(allow_redirects);
        self
    }

    /// Override the timeout configuration for this call
    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send the request and read the whole response body
    pub async fn send(self) -> ClientResult<Response> {
        self.dispatch(false).await
    }

    /// Send the request, leaving the response body as a lazy stream
    ///
    /// The caller must fully consume the stream, or `close()` the
    /// response, to release the underlying connection.
    pub async fn stream(self) -> ClientResult<Response> {
        self.dispatch(true).await
    }

    async fn dispatch(self, stream: bool) -> ClientResult<Response> {
        let RequestBuilder {
            client,
            method,
            url,
            params,
            headers,
            cookies,
            body,
            auth,
            allow_redirects,
            timeout,
            error,
        } = self;
        if let Some(error) = error {
            return Err(error);
        }

        let allow_redirects = allow_redirects.unwrap_or(method != Method::HEAD);
        let request = client.build_request(method, &url, &params, &headers, &cookies, body)?;
        let timeout = timeout.as_ref().unwrap_or(&client.timeout);
        client
            .perform(request, auth, allow_redirects, timeout, stream)
            .await
    }
}
