use std::net::SocketAddr;
use std::time::Duration;

use client_errors::ClientError;
use client_types::{PoolLimits, Request, Response, Timeout, Transport};
use connection_pool::ConnectionPool;
use http::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Serve canned HTTP/1.1 responses on a local socket.
///
/// Each accepted connection reads request heads and answers with the next
/// canned response, keeping the connection open until the responses run out.
async fn serve(responses: Vec<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let responses = responses.clone();
            tokio::spawn(async move {
                let mut buffer = vec![0u8; 4096];
                for response in responses {
                    let mut head = Vec::new();
                    loop {
                        let Ok(n) = socket.read(&mut buffer).await else {
                            return;
                        };
                        if n == 0 {
                            return;
                        }
                        head.extend_from_slice(&buffer[..n]);
                        if head.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    if socket.write_all(response.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

fn ok_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

fn request_to(addr: SocketAddr) -> Request {
    let url = Url::parse(&format!("http://{}/", addr)).unwrap();
    Request::new(Method::GET, url).unwrap()
}

async fn read_and_close(mut response: Response) -> Vec<u8> {
    let content = response.read().await.unwrap();
    response.close();
    content.to_vec()
}

#[tokio::test]
async fn test_get_returns_body_and_recycles_connection() {
    let addr = serve(vec![ok_response("Hello, world!"), ok_response("again")]).await;
    let pool = ConnectionPool::new(PoolLimits::default());
    let timeout = Timeout::default();

    let response = pool.send(request_to(addr), &timeout).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.version, http::Version::HTTP_11);
    let body = read_and_close(response).await;
    assert_eq!(body, b"Hello, world!");

    // Fully read, so the connection went back to the idle set.
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.idle_count(), 1);

    // A second request reuses it.
    let response = pool.send(request_to(addr), &timeout).await.unwrap();
    assert_eq!(read_and_close(response).await, b"again");
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn test_connection_close_is_not_recycled() {
    let addr = serve(vec![
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_string(),
    ])
    .await;
    let pool = ConnectionPool::new(PoolLimits::default());

    let response = pool.send(request_to(addr), &Timeout::default()).await.unwrap();
    read_and_close(response).await;
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.active_count(), 0);
}

#[tokio::test]
async fn test_premature_close_discards_connection() {
    let addr = serve(vec![ok_response("a long enough body")]).await;
    let pool = ConnectionPool::new(PoolLimits::default());

    let mut response = pool.send(request_to(addr), &Timeout::default()).await.unwrap();
    response.close();
    // Closing before the body was read leaves the wire indeterminate.
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.active_count(), 0);
}

#[tokio::test]
async fn test_keepalive_expiry_zero_expires_immediately() {
    let addr = serve(vec![ok_response("one")]).await;
    let limits = PoolLimits {
        keepalive_expiry: Some(Duration::ZERO),
        ..PoolLimits::default()
    };
    let pool = ConnectionPool::new(limits);

    let response = pool.send(request_to(addr), &Timeout::default()).await.unwrap();
    read_and_close(response).await;
    assert_eq!(pool.idle_count(), 0);
}

#[tokio::test]
async fn test_pool_timeout_when_saturated() {
    let addr = serve(vec![ok_response("held"), ok_response("later")]).await;
    let limits = PoolLimits {
        hard_limit: 1,
        pool_timeout: Some(Duration::from_micros(100)),
        ..PoolLimits::default()
    };
    let pool = ConnectionPool::new(limits);
    let timeout = Timeout::default();

    // First response unread: the single connection stays leased.
    let mut held = pool.send(request_to(addr), &timeout).await.unwrap();
    assert_eq!(pool.active_count(), 1);

    let error = pool.send(request_to(addr), &timeout).await.unwrap_err();
    assert!(matches!(error, ClientError::PoolTimeout));

    // Reading the held response frees the slot.
    held.read().await.unwrap();
    assert_eq!(pool.active_count(), 0);
    let response = pool.send(request_to(addr), &timeout).await.unwrap();
    assert_eq!(read_and_close(response).await, b"later");
}

#[tokio::test]
async fn test_connect_failure_is_network_error() {
    // Bind then drop a listener so the port is very likely refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let pool = ConnectionPool::new(PoolLimits::default());
    let error = pool.send(request_to(addr), &Timeout::default()).await.unwrap_err();
    assert!(matches!(error, ClientError::Network(_)));
    assert_eq!(pool.active_count(), 0);
}

#[tokio::test]
async fn test_close_drains_idle_connections() {
    let addr = serve(vec![ok_response("x")]).await;
    let pool = ConnectionPool::new(PoolLimits::default());

    let response = pool.send(request_to(addr), &Timeout::default()).await.unwrap();
    read_and_close(response).await;
    assert_eq!(pool.idle_count(), 1);

    pool.close().await;
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.active_count(), 0);

    let error = pool.send(request_to(addr), &Timeout::default()).await.unwrap_err();
    assert!(matches!(error, ClientError::Network(_)));
}

#[tokio::test]
async fn test_read_timeout_on_stalled_body() {
    // Respond with headers promising more body than is ever sent.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buffer = vec![0u8; 1024];
        let _ = socket.read(&mut buffer).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
            .await
            .unwrap();
        // Hold the socket open without sending the rest.
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let pool = ConnectionPool::new(PoolLimits::default());
    let timeout = Timeout {
        read: Some(Duration::from_millis(200)),
        ..Timeout::default()
    };
    let mut response = pool.send(request_to(addr), &timeout).await.unwrap();
    let error = response.read().await.unwrap_err();
    assert!(matches!(error, ClientError::ReadTimeout));
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.idle_count(), 0);
}
