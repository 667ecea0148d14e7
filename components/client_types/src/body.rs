//! Streaming request body model
//!
//! A request body is a lazy sequence of byte chunks with three capability
//! flags: whether it can be replayed, whether its length is known up front,
//! and whether it has already been consumed.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use client_errors::{ClientError, ClientResult};
use futures::stream::{self, Stream};

/// A boxed stream of byte chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = ClientResult<Bytes>> + Send>>;

enum RequestBodyKind {
    Empty,
    Bytes(Bytes),
    Stream {
        stream: Option<ChunkStream>,
        length: Option<u64>,
    },
}

/// A lazy request body
///
/// `Empty` and `Bytes` bodies can be replayed any number of times, which is
/// what digest retries and 307/308 redirects require. `Stream` bodies can be
/// sent exactly once.
pub struct RequestBody {
    kind: RequestBodyKind,
    consumed: bool,
}

impl RequestBody {
    /// An empty body
    pub fn empty() -> Self {
        Self {
            kind: RequestBodyKind::Empty,
            consumed: false,
        }
    }

    /// A fully-buffered body
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            kind: RequestBodyKind::Bytes(bytes.into()),
            consumed: false,
        }
    }

    /// A streaming body, optionally with a known total length
    pub fn from_stream(stream: ChunkStream, length: Option<u64>) -> Self {
        Self {
            kind: RequestBodyKind::Stream {
                stream: Some(stream),
                length,
            },
            consumed: false,
        }
    }

    /// Whether the body may be consumed more than once
    pub fn can_replay(&self) -> bool {
        !matches!(self.kind, RequestBodyKind::Stream { .. })
    }

    /// Total byte count when known
    pub fn known_length(&self) -> Option<u64> {
        match &self.kind {
            RequestBodyKind::Empty => Some(0),
            RequestBodyKind::Bytes(bytes) => Some(bytes.len() as u64),
            RequestBodyKind::Stream { length, .. } => *length,
        }
    }

    /// Whether the chunk stream has already been handed out
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Whether the body is known to be zero-length
    pub fn is_empty(&self) -> bool {
        self.known_length() == Some(0)
    }

    /// Produce a fresh, unconsumed copy of this body
    ///
    /// Fails with `RequestBodyUnavailable` for streaming bodies, which
    /// cannot be rewound.
    pub fn replay(&self) -> ClientResult<RequestBody> {
        match &self.kind {
            RequestBodyKind::Empty => Ok(RequestBody::empty()),
            RequestBodyKind::Bytes(bytes) => Ok(RequestBody::from_bytes(bytes.clone())),
            RequestBodyKind::Stream { .. } => Err(ClientError::RequestBodyUnavailable),
        }
    }

    /// Hand the chunk stream to a transport, exactly once
    ///
    /// A second call fails with `StreamConsumed`. Replayable bodies reset
    /// their consumed flag through `replay()` instead.
    pub fn take_chunks(&mut self) -> ClientResult<ChunkStream> {
        if self.consumed {
            return Err(ClientError::StreamConsumed);
        }
        self.consumed = true;
        match &mut self.kind {
            RequestBodyKind::Empty => Ok(Box::pin(stream::empty())),
            RequestBodyKind::Bytes(bytes) => {
                let chunk = bytes.clone();
                if chunk.is_empty() {
                    Ok(Box::pin(stream::empty()))
                } else {
                    Ok(Box::pin(stream::once(async move { Ok(chunk) })))
                }
            }
            RequestBodyKind::Stream { stream, .. } => stream
                .take()
                .ok_or(ClientError::StreamConsumed),
        }
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RequestBodyKind::Empty => f.debug_tuple("Empty").finish(),
            RequestBodyKind::Bytes(bytes) => f
                .debug_tuple("Bytes")
                .field(&format!("{} bytes", bytes.len()))
                .finish(),
            RequestBodyKind::Stream { length, .. } => f
                .debug_struct("Stream")
                .field("length", length)
                .field("consumed", &self.consumed)
                .finish(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        Self::from_bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::from_bytes(text.into_bytes())
    }
}
