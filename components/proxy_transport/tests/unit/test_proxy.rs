use std::net::SocketAddr;

use client_errors::ClientError;
use client_types::{PoolLimits, Request, Timeout, Transport};
use http::Method;
use proxy_transport::{Proxy, ProxyMode, ProxyTransport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buffer = vec![0u8; 4096];
    loop {
        let n = socket.read(&mut buffer).await.unwrap();
        assert!(n > 0, "peer closed before the full head arrived");
        head.extend_from_slice(&buffer[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8(head).unwrap()
}

fn transport_to(addr: SocketAddr, mode: ProxyMode) -> ProxyTransport {
    let proxy = Proxy::new(Url::parse(&format!("http://{}/", addr)).unwrap()).with_mode(mode);
    ProxyTransport::new(proxy, PoolLimits::default()).unwrap()
}

#[tokio::test]
async fn test_tunnel_wire_exchange() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let connect = read_head(&mut socket).await;
        let mut lines = connect.lines();
        assert_eq!(lines.next().unwrap(), "CONNECT example.com:80 HTTP/1.1");
        assert!(connect.contains(&format!("Host: {}\r\n", proxy_addr)));

        socket
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .await
            .unwrap();

        // The tunneled request comes over the same socket.
        let request = read_head(&mut socket).await;
        let mut lines = request.lines();
        assert_eq!(lines.next().unwrap(), "GET / HTTP/1.1");
        // hyper writes header names lowercase on the wire.
        assert!(request.to_lowercase().contains("host: example.com\r\n"));

        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\n\r\ntunneled")
            .await
            .unwrap();
    });

    let transport = transport_to(proxy_addr, ProxyMode::TunnelOnly);
    let request =
        Request::new(Method::GET, Url::parse("http://example.com/").unwrap()).unwrap();
    let mut response = transport.send(request, &Timeout::default()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.read().await.unwrap().as_ref(), b"tunneled");
}

#[tokio::test]
async fn test_connect_rejection_carries_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_head(&mut socket).await;
        socket
            .write_all(b"HTTP/1.1 403 Forbidden\r\n\r\n")
            .await
            .unwrap();
    });

    let transport = transport_to(proxy_addr, ProxyMode::TunnelOnly);
    let request =
        Request::new(Method::GET, Url::parse("http://example.com/").unwrap()).unwrap();
    let error = transport.send(request, &Timeout::default()).await.unwrap_err();
    match error {
        ClientError::Proxy { status, .. } => assert_eq!(status, Some(403)),
        other => panic!("expected a proxy error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_forward_mode_rewrites_request_line() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_head(&mut socket).await;
        let mut lines = request.lines();
        assert_eq!(lines.next().unwrap(), "GET http://example.com/ HTTP/1.1");
        // Credentials from the proxy URL ride along on each request.
        assert!(request.contains("proxy-authorization: Basic dXNlcjpwYXNz\r\n"));
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\nforwarded")
            .await
            .unwrap();
    });

    let proxy_url = Url::parse(&format!("http://user:pass@{}/", proxy_addr)).unwrap();
    let proxy = Proxy::new(proxy_url).with_mode(ProxyMode::ForwardOnly);
    let transport = ProxyTransport::new(proxy, PoolLimits::default()).unwrap();

    let request =
        Request::new(Method::GET, Url::parse("http://example.com/").unwrap()).unwrap();
    let mut response = transport.send(request, &Timeout::default()).await.unwrap();
    assert_eq!(response.read().await.unwrap().as_ref(), b"forwarded");
}

#[tokio::test]
async fn test_forward_only_rejects_https_targets() {
    let transport = transport_to("127.0.0.1:1".parse().unwrap(), ProxyMode::ForwardOnly);
    let request =
        Request::new(Method::GET, Url::parse("https://example.com/").unwrap()).unwrap();
    let error = transport.send(request, &Timeout::default()).await.unwrap_err();
    assert!(matches!(error, ClientError::Proxy { status: None, .. }));
}
