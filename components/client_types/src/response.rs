//! Response value objects and body lifecycle
//!
//! A response body is read at most once. The underlying connection lease is
//! owned by the chunk stream: it is released when the stream is fully
//! consumed, and closed when the stream is dropped early.

use std::fmt;

use bytes::{Bytes, BytesMut};
use client_errors::{ClientError, ClientResult};
use futures::stream;
use futures::StreamExt;
use http::header::LOCATION;
use http::{Extensions, HeaderMap, StatusCode, Version};

use crate::{ChunkStream, RequestHead};

/// Body state for a response
///
/// Transitions: `Unread` → `Read` (via `read()`), `Unread` → `Consumed`
/// (via `stream()`), any unread state → `Closed` (via `close()`). `Read`
/// survives `close()` so buffered content stays accessible.
pub enum ResponseBody {
    /// The body stream has not been touched yet
    Unread(ChunkStream),
    /// The stream was handed out for iteration
    Consumed,
    /// The body was drained into memory
    Read(Bytes),
    /// The body was closed without being read
    Closed,
}

impl ResponseBody {
    /// A body that is already fully buffered
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let chunk = bytes.into();
        if chunk.is_empty() {
            ResponseBody::Unread(Box::pin(stream::empty()))
        } else {
            ResponseBody::Unread(Box::pin(stream::once(async move { Ok(chunk) })))
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Unread(_) => f.debug_tuple("Unread").field(&"<stream>").finish(),
            ResponseBody::Consumed => f.debug_tuple("Consumed").finish(),
            ResponseBody::Read(bytes) => f
                .debug_tuple("Read")
                .field(&format!("{} bytes", bytes.len()))
                .finish(),
            ResponseBody::Closed => f.debug_tuple("Closed").finish(),
        }
    }
}

/// An incoming HTTP response
#[derive(Debug)]
pub struct Response {
    /// Response status code
    pub status: StatusCode,
    /// Negotiated HTTP version
    pub version: Version,
    /// Response headers
    pub headers: HeaderMap,
    body: ResponseBody,
    request: RequestHead,
    /// Intermediate responses (redirects, auth challenges) that led here,
    /// in the order they were received
    pub history: Vec<Response>,
    /// Per-response extension data
    pub extensions: Extensions,
}

impl Response {
    /// Build a response around an unread body stream
    pub fn new(
        status: StatusCode,
        version: Version,
        headers: HeaderMap,
        body: ResponseBody,
        request: RequestHead,
    ) -> Response {
        Response {
            status,
            version,
            headers,
            body,
            request,
            history: Vec::new(),
            extensions: Extensions::new(),
        }
    }

    /// The request that produced this response
    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    /// The reason phrase for the status code, when one is defined
    pub fn reason(&self) -> Option<&'static str> {
        self.status.canonical_reason()
    }

    /// Whether this response is a redirect the client can follow
    pub fn is_redirect(&self) -> bool {
        matches!(self.status.as_u16(), 301 | 302 | 303 | 307 | 308)
            && self.headers.contains_key(LOCATION)
    }

    /// Drain the body into memory, releasing the connection
    ///
    /// Idempotent: after the first call the buffered content is returned
    /// again without touching the network.
    pub async fn read(&mut self) -> ClientResult<Bytes> {
        match &self.body {
            ResponseBody::Read(bytes) => return Ok(bytes.clone()),
            ResponseBody::Consumed => return Err(ClientError::StreamConsumed),
            ResponseBody::Closed => return Err(ClientError::ResponseClosed),
            ResponseBody::Unread(_) => {}
        }
        // Take the stream out; on a mid-body error the state stays Closed
        // and dropping the stream closes the connection.
        let mut stream = match std::mem::replace(&mut self.body, ResponseBody::Closed) {
            ResponseBody::Unread(stream) => stream,
            _ => return Err(ClientError::ResponseClosed),
        };
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        let content = buffer.freeze();
        self.body = ResponseBody::Read(content.clone());
        Ok(content)
    }

    /// Take the body as a stream of chunks
    ///
    /// The connection is released when the final chunk is yielded; a caller
    /// that abandons the stream early must drop it (which closes the
    /// connection) or call `close()`.
    pub fn stream(&mut self) -> ClientResult<ChunkStream> {
        match std::mem::replace(&mut self.body, ResponseBody::Consumed) {
            ResponseBody::Unread(stream) => Ok(stream),
            ResponseBody::Read(bytes) => {
                self.body = ResponseBody::Read(bytes.clone());
                if bytes.is_empty() {
                    Ok(Box::pin(stream::empty()))
                } else {
                    Ok(Box::pin(stream::once(async move { Ok(bytes) })))
                }
            }
            ResponseBody::Consumed => Err(ClientError::StreamConsumed),
            ResponseBody::Closed => {
                self.body = ResponseBody::Closed;
                Err(ClientError::ResponseClosed)
            }
        }
    }

    /// Release the connection without reading the rest of the body
    ///
    /// If unread bytes remain on the wire the connection is closed rather
    /// than reused. Safe to call multiple times; buffered content from a
    /// prior `read()` remains accessible.
    pub fn close(&mut self) {
        match self.body {
            ResponseBody::Read(_) => {}
            _ => {
                // Dropping an unread stream closes its lease.
                self.body = ResponseBody::Closed;
            }
        }
    }

    /// The buffered body content
    ///
    /// Fails with `ResponseNotRead` until `read()` has been called.
    pub fn content(&self) -> ClientResult<&Bytes> {
        match &self.body {
            ResponseBody::Read(bytes) => Ok(bytes),
            ResponseBody::Unread(_) => Err(ClientError::ResponseNotRead),
            ResponseBody::Consumed => Err(ClientError::StreamConsumed),
            ResponseBody::Closed => Err(ClientError::ResponseClosed),
        }
    }

    /// The buffered body decoded as UTF-8
    pub fn text(&self) -> ClientResult<String> {
        let content = self.content()?;
        String::from_utf8(content.to_vec())
            .map_err(|error| ClientError::Decoding(error.to_string()))
    }

    /// Raise `HttpStatus` for 4xx/5xx responses
    pub fn raise_for_status(&self) -> ClientResult<()> {
        if self.status.is_client_error() || self.status.is_server_error() {
            return Err(ClientError::HttpStatus {
                status: self.status.as_u16(),
                url: self.request.url.clone(),
            });
        }
        Ok(())
    }
}
