//! A single pooled HTTP/1.1 connection
//!
//! Wraps a hyper client conn handle. The connection task is spawned at
//! handshake time and drives the socket until the handle is dropped.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use client_errors::{ClientError, ClientResult};
use client_types::{ChunkStream, Origin};
use futures::Stream;
use hyper::body::{Body, Frame, SizeHint};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

use crate::connector::{BoxedIo, Connector};

/// Connection state: IDLE in the pool, ACTIVE while leased
///
/// CLOSED has no explicit representation; a closed connection is dropped,
/// which ends its socket task and frees its pool permit.
pub(crate) struct PooledConnection {
    pub(crate) id: u64,
    pub(crate) origin: Origin,
    pub(crate) sender: http1::SendRequest<OutgoingBody>,
    pub(crate) last_use: Instant,
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Whether the underlying socket task still accepts requests
    pub(crate) fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Open a connection to an origin and perform the HTTP/1.1 handshake
pub(crate) async fn open(
    connector: &dyn Connector,
    origin: &Origin,
    id: u64,
    permit: OwnedSemaphorePermit,
) -> ClientResult<PooledConnection> {
    let io = connector.connect(origin).await?;
    let (sender, conn) = http1::handshake::<TokioIo<BoxedIo>, OutgoingBody>(TokioIo::new(io))
        .await
        .map_err(|error| ClientError::Network(format!("handshake failed: {}", error)))?;

    tokio::spawn(async move {
        if let Err(error) = conn.await {
            debug!(%error, "connection task ended");
        }
    });

    debug!(id, %origin, "opened connection");
    Ok(PooledConnection {
        id,
        origin: origin.clone(),
        sender,
        last_use: Instant::now(),
        permit,
    })
}

/// Adapts a request chunk stream to the hyper body contract
pub(crate) struct OutgoingBody {
    chunks: Option<ChunkStream>,
    length: Option<u64>,
}

impl OutgoingBody {
    pub(crate) fn new(chunks: ChunkStream, length: Option<u64>) -> Self {
        match length {
            // Skip the stream machinery entirely for empty bodies.
            Some(0) => Self {
                chunks: None,
                length,
            },
            _ => Self {
                chunks: Some(chunks),
                length,
            },
        }
    }
}

impl Body for OutgoingBody {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let Some(stream) = this.chunks.as_mut() else {
            return Poll::Ready(None);
        };
        match stream.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Poll::Ready(Some(Err(error))) => {
                this.chunks = None;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.chunks = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.chunks.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match self.length {
            Some(length) => SizeHint::with_exact(length),
            None => SizeHint::default(),
        }
    }
}
