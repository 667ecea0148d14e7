//! Request value objects

use std::fmt;

use client_errors::{ClientError, ClientResult};
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{Extensions, HeaderMap, HeaderValue, Method};
use url::Url;

use crate::{authority, RequestBody};

/// An outgoing HTTP request
///
/// Invariants enforced at construction:
/// - the `Host` header equals the URL authority;
/// - `Content-Length` is present iff the body has a known non-zero length;
/// - unknown-length bodies carry `Transfer-Encoding: chunked`.
pub struct Request {
    /// Request method
    pub method: Method,
    /// Absolute request URL
    pub url: Url,
    /// Request headers, including `Host` and any framing headers
    pub headers: HeaderMap,
    /// Request body stream
    pub body: RequestBody,
    /// Per-request extension data
    pub extensions: Extensions,
}

impl Request {
    /// Build a request with an empty body
    pub fn new(method: Method, url: Url) -> ClientResult<Request> {
        Self::with_body(method, url, RequestBody::empty())
    }

    /// Build a request with the given body
    pub fn with_body(method: Method, url: Url, body: RequestBody) -> ClientResult<Request> {
        let mut request = Request {
            method,
            url,
            headers: HeaderMap::new(),
            body,
            extensions: Extensions::new(),
        };
        request.prepare()?;
        Ok(request)
    }

    /// (Re-)establish the header invariants after the URL or body changed
    pub fn prepare(&mut self) -> ClientResult<()> {
        let host = authority(&self.url)?;
        self.headers.insert(
            HOST,
            HeaderValue::from_str(&host)
                .map_err(|_| ClientError::InvalidUrl(format!("invalid host: {}", host)))?,
        );

        self.headers.remove(CONTENT_LENGTH);
        self.headers.remove(TRANSFER_ENCODING);
        match self.body.known_length() {
            Some(0) => {}
            Some(length) => {
                self.headers
                    .insert(CONTENT_LENGTH, HeaderValue::from(length));
            }
            None => {
                self.headers
                    .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
        }
        Ok(())
    }

    /// Snapshot of the request without its body
    ///
    /// Responses and errors keep this instead of the request itself, so the
    /// body's single ownership is never shared.
    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

/// Method, URL, and headers of a request, without the body
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Request method
    pub method: Method,
    /// Absolute request URL
    pub url: Url,
    /// Request headers as sent
    pub headers: HeaderMap,
}
