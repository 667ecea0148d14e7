//! The Transport interface and the in-process mock transport

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use client_errors::ClientResult;
use futures::StreamExt;
use http::{HeaderMap, StatusCode, Version};

use crate::{Request, RequestHead, Response, ResponseBody, Timeout};

/// The capability interface between the client and the network
///
/// A transport accepts a fully-prepared request and a timeout policy, and
/// returns a response whose body stream holds whatever underlying resources
/// the exchange used until it is consumed or closed. Concrete transports:
/// the connection pool, the proxy transport, and `MockTransport`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the response with a lazy body
    async fn send(&self, request: Request, timeout: &Timeout) -> ClientResult<Response>;

    /// Release every resource owned by the transport
    async fn close(&self) {}
}

/// A canned response returned by a mock handler
#[derive(Debug)]
pub struct MockResponse {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body bytes
    pub body: Bytes,
}

impl MockResponse {
    /// A response with the given status and no headers or body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, name: http::header::HeaderName, value: &str) -> Self {
        self.headers
            .append(name, value.parse().expect("valid mock header value"));
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

type MockHandler =
    dyn Fn(&RequestHead, Bytes) -> ClientResult<MockResponse> + Send + Sync + 'static;

/// A transport that dispatches to a user handler instead of the network
///
/// The request body is buffered before the handler is invoked, so handlers
/// can assert on it. Used for tests and for in-process applications.
#[derive(Clone)]
pub struct MockTransport {
    handler: Arc<MockHandler>,
}

impl MockTransport {
    /// Wrap a handler function
    pub fn new(
        handler: impl Fn(&RequestHead, Bytes) -> ClientResult<MockResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, mut request: Request, _timeout: &Timeout) -> ClientResult<Response> {
        let head = request.head();

        let mut chunks = request.body.take_chunks()?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = chunks.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        let mock = (self.handler)(&head, buffer.freeze())?;
        Ok(Response::new(
            mock.status,
            Version::HTTP_11,
            mock.headers,
            ResponseBody::from_bytes(mock.body),
            head,
        ))
    }
}
