//! connection_pool component
//!
//! The default transport: keep-alive HTTP/1.1 connections pooled per
//! origin, with soft/hard concurrency limits, timed expiry, and leases
//! released exactly once per exchange.
//!
//! A response returned by [`ConnectionPool::send`] holds a lease on its
//! connection inside the body stream. Fully consuming the stream returns
//! the connection to the idle set; dropping the stream early closes it.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use client_errors::{ClientError, ClientResult};
use client_types::{
    request_target, Origin, PoolLimits, Request, Response, ResponseBody, Timeout, Transport,
};
use futures::Stream;
use http::header::CONNECTION;
use http::HeaderMap;
use hyper::body::{Body, Incoming};
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::time::Sleep;
use tracing::{debug, trace};

mod connection;
mod connector;

pub use connector::{BoxedIo, Connector, IoStream, TcpConnector};
#[cfg(unix)]
pub use connector::UnixConnector;

use connection::{OutgoingBody, PooledConnection};

/// Request extension: route the exchange through this origin instead of
/// the origin of the request URL (forward proxying)
#[derive(Debug, Clone)]
pub struct ViaProxy(pub Origin);

/// Request extension: write the absolute URI on the request line rather
/// than the origin-form target (forward proxying)
#[derive(Debug, Clone)]
pub struct AbsoluteForm;

struct PoolState {
    idle: HashMap<Origin, VecDeque<PooledConnection>>,
    active: usize,
}

struct PoolShared {
    limits: PoolLimits,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    closed: AtomicBool,
}

impl PoolShared {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return a connection at the end of a lease
    ///
    /// Closing is the default: the connection is only kept when the body
    /// completed cleanly, the handle is still open, keep-alive is enabled,
    /// and the idle set is under the soft limit.
    fn release(&self, mut connection: PooledConnection, reusable: bool) {
        let mut state = self.lock_state();
        state.active = state.active.saturating_sub(1);

        let keepalive_disabled =
            matches!(self.limits.keepalive_expiry, Some(expiry) if expiry.is_zero());
        if !reusable
            || keepalive_disabled
            || self.closed.load(Ordering::SeqCst)
            || !connection.is_open()
        {
            debug!(id = connection.id, "closing connection");
            return;
        }

        let idle_total: usize = state.idle.values().map(VecDeque::len).sum();
        if idle_total >= self.limits.soft_limit {
            debug!(id = connection.id, "closing connection over soft limit");
            return;
        }

        trace!(id = connection.id, "returning connection to idle set");
        connection.last_use = Instant::now();
        state
            .idle
            .entry(connection.origin.clone())
            .or_default()
            .push_back(connection);
    }

    /// Drop idle connections that expired or whose socket closed remotely
    fn sweep(&self) {
        let expiry = self.limits.keepalive_expiry;
        let mut state = self.lock_state();
        state.idle.retain(|_, connections| {
            connections.retain(|connection| {
                connection.is_open()
                    && !matches!(expiry, Some(expiry) if connection.last_use.elapsed() >= expiry)
            });
            !connections.is_empty()
        });
    }

    /// Close the least-recently-used idle connection, freeing its permit
    fn evict_lru_idle(&self) {
        let mut state = self.lock_state();
        let lru_origin = state
            .idle
            .iter()
            .filter_map(|(origin, connections)| {
                connections.front().map(|conn| (origin.clone(), conn.last_use))
            })
            .min_by_key(|(_, last_use)| *last_use)
            .map(|(origin, _)| origin);

        if let Some(origin) = lru_origin {
            if let Some(connections) = state.idle.get_mut(&origin) {
                if let Some(evicted) = connections.pop_front() {
                    debug!(id = evicted.id, %origin, "evicting idle connection");
                }
                if connections.is_empty() {
                    state.idle.remove(&origin);
                }
            }
        }
    }
}

/// An exclusive claim on one pooled connection for one exchange
///
/// Finished exactly once: explicitly with the reuse decision, or on drop
/// as a close. The double-release case is structurally impossible because
/// the connection moves out of the lease.
struct ConnectionLease {
    shared: Arc<PoolShared>,
    connection: Option<PooledConnection>,
}

impl ConnectionLease {
    fn finish(&mut self, reusable: bool) {
        if let Some(connection) = self.connection.take() {
            self.shared.release(connection, reusable);
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.finish(false);
    }
}

/// Connection pool transport for HTTP/1.1
///
/// Connections are keyed by origin and leased to at most one in-flight
/// request at a time. `hard_limit` is enforced by a counting semaphore
/// whose permits live inside the connections themselves.
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
    connector: Arc<dyn Connector>,
    next_id: AtomicU64,
}

impl ConnectionPool {
    /// Create a pool using plain TCP connections
    pub fn new(limits: PoolLimits) -> Self {
        Self::with_connector(limits, TcpConnector)
    }

    /// Create a pool with a custom connector (Unix sockets, proxy tunnels)
    pub fn with_connector(limits: PoolLimits, connector: impl Connector + 'static) -> Self {
        let semaphore = Arc::new(Semaphore::new(limits.hard_limit));
        Self {
            shared: Arc::new(PoolShared {
                limits,
                semaphore,
                state: Mutex::new(PoolState {
                    idle: HashMap::new(),
                    active: 0,
                }),
                closed: AtomicBool::new(false),
            }),
            connector: Arc::new(connector),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of idle connections currently held
    pub fn idle_count(&self) -> usize {
        self.shared.lock_state().idle.values().map(VecDeque::len).sum()
    }

    /// Number of connections currently leased to in-flight requests
    pub fn active_count(&self) -> usize {
        self.shared.lock_state().active
    }

    fn lease(&self, connection: PooledConnection) -> ConnectionLease {
        ConnectionLease {
            shared: self.shared.clone(),
            connection: Some(connection),
        }
    }

    async fn acquire_permit(
        &self,
        timeout: &Timeout,
    ) -> ClientResult<tokio::sync::OwnedSemaphorePermit> {
        match self.shared.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => {
                return Err(ClientError::Network("connection pool is closed".to_string()))
            }
            Err(TryAcquireError::NoPermits) => {}
        }

        // Saturated. An idle connection for another origin can give up its
        // slot before we wait for one.
        self.shared.evict_lru_idle();

        let pool_timeout = timeout.pool.or(self.shared.limits.pool_timeout);
        let acquire = self.shared.semaphore.clone().acquire_owned();
        let acquired = match pool_timeout {
            Some(duration) => tokio::time::timeout(duration, acquire)
                .await
                .map_err(|_| ClientError::PoolTimeout)?,
            None => acquire.await,
        };
        acquired.map_err(|_| ClientError::Network("connection pool is closed".to_string()))
    }

    async fn checkout(&self, origin: &Origin, timeout: &Timeout) -> ClientResult<ConnectionLease> {
        {
            let mut state = self.shared.lock_state();
            while let Some(connection) = state
                .idle
                .get_mut(origin)
                .and_then(|connections| connections.pop_back())
            {
                if connection.is_open() {
                    trace!(id = connection.id, %origin, "reusing idle connection");
                    state.active += 1;
                    drop(state);
                    return Ok(self.lease(connection));
                }
                // Remotely closed while idle: drop and keep looking.
            }
        }

        let permit = self.acquire_permit(timeout).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let connect = connection::open(self.connector.as_ref(), origin, id, permit);
        let connection = match timeout.connect {
            Some(duration) => tokio::time::timeout(duration, connect)
                .await
                .map_err(|_| ClientError::ConnectTimeout)??,
            None => connect.await?,
        };

        self.shared.lock_state().active += 1;
        Ok(self.lease(connection))
    }
}

#[async_trait]
impl Transport for ConnectionPool {
    async fn send(&self, mut request: Request, timeout: &Timeout) -> ClientResult<Response> {
        let origin = match request.extensions.get::<ViaProxy>() {
            Some(via) => via.0.clone(),
            None => Origin::from_url(&request.url)?,
        };

        self.shared.sweep();

        let mut lease = self.checkout(&origin, timeout).await?;

        let uri: http::Uri = if request.extensions.get::<AbsoluteForm>().is_some() {
            request.url.as_str().parse()
        } else {
            request_target(&request.url).parse()
        }
        .map_err(|_| ClientError::InvalidUrl(request.url.to_string()))?;

        let head = request.head();
        let length = request.body.known_length();
        let chunks = request.body.take_chunks()?;

        let mut hyper_request = http::Request::builder()
            .method(request.method.clone())
            .uri(uri)
            .body(OutgoingBody::new(chunks, length))
            .map_err(|error| ClientError::Protocol(error.to_string()))?;
        *hyper_request.headers_mut() = request.headers.clone();

        let response = {
            let connection = match lease.connection.as_mut() {
                Some(connection) => connection,
                None => {
                    return Err(ClientError::Protocol(
                        "connection lease released before send".to_string(),
                    ))
                }
            };
            trace!(id = connection.id, method = %head.method, url = %head.url, "sending request");
            let ready = connection.sender.ready();
            match timeout.write {
                Some(duration) => tokio::time::timeout(duration, ready)
                    .await
                    .map_err(|_| ClientError::WriteTimeout)?,
                None => ready.await,
            }
            .map_err(map_hyper_error)?;

            let send = connection.sender.send_request(hyper_request);
            match timeout.read {
                Some(duration) => tokio::time::timeout(duration, send)
                    .await
                    .map_err(|_| ClientError::ReadTimeout)?,
                None => send.await,
            }
            .map_err(map_hyper_error)?
        };

        let (parts, incoming) = response.into_parts();
        let reusable = !connection_close(&parts.headers);
        let body = PooledBody {
            incoming,
            lease: Some(lease),
            reusable,
            read_timeout: timeout.read,
            sleep: None,
            done: false,
        };

        Ok(Response::new(
            parts.status,
            parts.version,
            parts.headers,
            ResponseBody::Unread(Box::pin(body)),
            head,
        ))
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.semaphore.close();
        self.shared.lock_state().idle.clear();
        debug!("connection pool closed");
    }
}

/// Response body stream that owns the connection lease
///
/// Clean completion releases the connection for reuse; an error, a read
/// timeout, or an early drop closes it, since the rest of the response on
/// the wire is indeterminate.
struct PooledBody {
    incoming: Incoming,
    lease: Option<ConnectionLease>,
    reusable: bool,
    read_timeout: Option<Duration>,
    sleep: Option<Pin<Box<Sleep>>>,
    done: bool,
}

impl Stream for PooledBody {
    type Item = ClientResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            match Pin::new(&mut this.incoming).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    if let Ok(data) = frame.into_data() {
                        this.sleep = None;
                        return Poll::Ready(Some(Ok(data)));
                    }
                    // Trailer frame: nothing to surface, keep polling.
                }
                Poll::Ready(Some(Err(error))) => {
                    this.done = true;
                    if let Some(mut lease) = this.lease.take() {
                        lease.finish(false);
                    }
                    return Poll::Ready(Some(Err(map_hyper_error(error))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    let reusable = this.reusable;
                    if let Some(mut lease) = this.lease.take() {
                        lease.finish(reusable);
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => {
                    if let Some(duration) = this.read_timeout {
                        let sleep = this
                            .sleep
                            .get_or_insert_with(|| Box::pin(tokio::time::sleep(duration)));
                        if sleep.as_mut().poll(cx).is_ready() {
                            this.done = true;
                            if let Some(mut lease) = this.lease.take() {
                                lease.finish(false);
                            }
                            return Poll::Ready(Some(Err(ClientError::ReadTimeout)));
                        }
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

fn map_hyper_error(error: hyper::Error) -> ClientError {
    if error.is_parse() || error.is_incomplete_message() {
        ClientError::Protocol(error.to_string())
    } else if error.is_timeout() {
        ClientError::ReadTimeout
    } else {
        ClientError::Network(error.to_string())
    }
}

/// Whether the response forbids reusing the connection
fn connection_close(headers: &HeaderMap) -> bool {
    headers.get_all(CONNECTION).iter().any(|value| {
        value
            .to_str()
            .map(|tokens| {
                tokens
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("close"))
            })
            .unwrap_or(false)
    })
}
