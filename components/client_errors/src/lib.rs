//! client_errors component
//!
//! Error handling: ClientError enum, Result alias, error conversion traits.
//!
//! This component provides the error taxonomy shared by every layer of the
//! client: the timeout family, transport failures, configuration problems,
//! response body state violations, and redirect/auth flow failures.
//!
//! # Examples
//!
//! ```
//! use client_errors::{ClientError, ClientResult};
//!
//! fn acquire_connection() -> ClientResult<()> {
//!     Err(ClientError::PoolTimeout)
//! }
//!
//! match acquire_connection() {
//!     Ok(()) => println!("acquired"),
//!     Err(e) if e.is_timeout() => println!("timed out: {}", e),
//!     Err(e) => println!("error: {}", e),
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use thiserror::Error;
use url::Url;

/// Client error types
///
/// Represents every failure mode surfaced by the client. Transport errors
/// are classified at the point of failure (connect vs read vs write); the
/// pool never retries on any of them.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Timed out while establishing a connection
    #[error("Connect timeout")]
    ConnectTimeout,

    /// Timed out while reading response data
    #[error("Read timeout")]
    ReadTimeout,

    /// Timed out while writing request data
    #[error("Write timeout")]
    WriteTimeout,

    /// Timed out while waiting for a connection pool permit
    #[error("Pool timeout")]
    PoolTimeout,

    /// Connection-level failure
    ///
    /// Covers refused connections, resets, and unexpected EOF.
    #[error("Network error: {0}")]
    Network(String),

    /// Violation of the HTTP protocol by either peer
    ///
    /// Also raised for malformed auth challenges.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Failure while talking to a proxy
    ///
    /// For CONNECT tunneling, `status` carries the proxy's non-2xx
    /// response status.
    #[error("Proxy error: {message}")]
    Proxy {
        /// Description of the failure
        message: String,
        /// Status returned by the proxy for a failed CONNECT, if any
        status: Option<u16>,
    },

    /// The URL could not be used for a request
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The URL scheme is not supported by any transport
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Multiple cookies matched an ambiguous lookup
    #[error("Cookie conflict: {0}")]
    CookieConflict(String),

    /// `Response::content` accessed before the body was read
    #[error("Attempted to access response content, without having called read()")]
    ResponseNotRead,

    /// Response body accessed after `close()`
    #[error("Attempted to read or stream response content, but the response has been closed")]
    ResponseClosed,

    /// Response stream iterated more than once
    #[error("Attempted to read or stream response content, but the content has already been streamed")]
    StreamConsumed,

    /// Response body bytes could not be decoded
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Redirect chain exceeded the configured maximum
    #[error("Exceeded maximum allowed redirects")]
    TooManyRedirects,

    /// Redirect chain revisited an exact (method, URL) pair
    #[error("Redirect loop detected")]
    RedirectLoop,

    /// A 307/308 redirect required a body that cannot be replayed
    #[error("Got a redirect response, but the request body was streaming and is no longer available")]
    RedirectBodyUnavailable,

    /// A redirect operation was invoked on a non-redirect response
    #[error("Not a redirect response")]
    NotRedirectResponse,

    /// A retry required a body that cannot be replayed
    #[error("Got a retry message, but the request body was streaming and is no longer available")]
    RequestBodyUnavailable,

    /// Functionality recognized but not provided by this client
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Error response status raised by `raise_for_status()`
    #[error("{status} error for url {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// URL of the request that produced the response
        url: Url,
    },

    /// Low-level I/O error from std::io::Error
    ///
    /// Automatically converted via the From trait.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether this error belongs to the timeout family
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectTimeout
                | ClientError::ReadTimeout
                | ClientError::WriteTimeout
                | ClientError::PoolTimeout
        )
    }
}

/// Result type alias for client operations
///
/// A convenience type alias that uses `ClientError` as the error type.
pub type ClientResult<T> = Result<T, ClientError>;
