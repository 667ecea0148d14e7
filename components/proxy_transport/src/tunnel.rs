//! HTTP CONNECT tunneling
//!
//! Establishes a tunnel through the proxy for a target origin, then hands
//! the raw stream back to the pool for the HTTP/1.1 handshake. Tunneled
//! connections are pooled per target origin like direct ones.

use async_trait::async_trait;
use client_errors::{ClientError, ClientResult};
use client_types::Origin;
use connection_pool::{BoxedIo, Connector};
use http::HeaderMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

pub(crate) struct TunnelConnector {
    proxy: Origin,
    proxy_authority: String,
    auth_header: Option<String>,
    extra_headers: Vec<(String, String)>,
}

impl TunnelConnector {
    pub(crate) fn new(
        proxy: Origin,
        proxy_authority: String,
        auth_header: Option<String>,
        headers: &HeaderMap,
    ) -> Self {
        let extra_headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        Self {
            proxy,
            proxy_authority,
            auth_header,
            extra_headers,
        }
    }
}

#[async_trait]
impl Connector for TunnelConnector {
    async fn connect(&self, origin: &Origin) -> ClientResult<BoxedIo> {
        let mut stream = TcpStream::connect((self.proxy.host.as_str(), self.proxy.port))
            .await
            .map_err(|error| ClientError::Proxy {
                message: format!("failed to connect to proxy: {}", error),
                status: None,
            })?;

        // Request target is host:port; the Host header names the proxy.
        let mut connect_request = format!(
            "CONNECT {}:{} HTTP/1.1\r\nHost: {}\r\n",
            origin.host, origin.port, self.proxy_authority
        );
        if let Some(auth) = &self.auth_header {
            connect_request.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
        }
        for (name, value) in &self.extra_headers {
            connect_request.push_str(&format!("{}: {}\r\n", name, value));
        }
        connect_request.push_str("\r\n");

        stream
            .write_all(connect_request.as_bytes())
            .await
            .map_err(|error| ClientError::Proxy {
                message: format!("failed to send CONNECT request: {}", error),
                status: None,
            })?;

        let mut reader = BufReader::new(&mut stream);
        let mut status_line = String::new();
        reader
            .read_line(&mut status_line)
            .await
            .map_err(|error| ClientError::Proxy {
                message: format!("failed to read proxy response: {}", error),
                status: None,
            })?;

        let parts: Vec<&str> = status_line.split_whitespace().collect();
        let status_code = parts
            .get(1)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| ClientError::Proxy {
                message: "invalid response to CONNECT request".to_string(),
                status: None,
            })?;

        if !(200..300).contains(&status_code) {
            return Err(ClientError::Proxy {
                message: format!(
                    "CONNECT {}:{} rejected by proxy: {}",
                    origin.host,
                    origin.port,
                    status_line.trim()
                ),
                status: Some(status_code),
            });
        }

        // Drain the remaining response headers until the empty line.
        loop {
            let mut line = String::new();
            reader
                .read_line(&mut line)
                .await
                .map_err(|error| ClientError::Proxy {
                    message: format!("failed to read proxy response headers: {}", error),
                    status: None,
                })?;
            if line == "\r\n" || line == "\n" || line.is_empty() {
                break;
            }
        }

        debug!(target = %origin, proxy = %self.proxy, "tunnel established");
        Ok(Box::new(stream))
    }
}
