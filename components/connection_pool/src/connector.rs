//! Connection establishment
//!
//! The `Connector` trait opens a byte stream to an origin. Socket policy
//! (TCP, Unix domain sockets, proxy tunnels) lives behind this boundary so
//! the pool itself never cares how bytes reach the peer.

use async_trait::async_trait;
use client_errors::{ClientError, ClientResult};
use client_types::Origin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A duplex byte stream a connection can run over
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

/// A boxed duplex byte stream
pub type BoxedIo = Box<dyn IoStream>;

/// Opens byte streams to origins
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a stream to the given origin
    async fn connect(&self, origin: &Origin) -> ClientResult<BoxedIo>;
}

/// Plain TCP connector, the default
#[derive(Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, origin: &Origin) -> ClientResult<BoxedIo> {
        let stream = TcpStream::connect((origin.host.as_str(), origin.port))
            .await
            .map_err(|error| ClientError::Network(format!("connect failed: {}", error)))?;
        Ok(Box::new(stream))
    }
}

/// Unix domain socket connector
///
/// Routes every origin to one filesystem socket; the origin still shapes
/// the `Host` header and pool keying.
#[cfg(unix)]
#[derive(Debug)]
pub struct UnixConnector {
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl UnixConnector {
    /// Connect through the socket at `path`
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
#[async_trait]
impl Connector for UnixConnector {
    async fn connect(&self, _origin: &Origin) -> ClientResult<BoxedIo> {
        let stream = tokio::net::UnixStream::connect(&self.path)
            .await
            .map_err(|error| ClientError::Network(format!("uds connect failed: {}", error)))?;
        Ok(Box::new(stream))
    }
}
