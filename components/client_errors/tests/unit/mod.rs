// Unit tests for client_errors

use client_errors::{ClientError, ClientResult};
use url::Url;

#[test]
fn test_display_messages() {
    assert_eq!(ClientError::PoolTimeout.to_string(), "Pool timeout");
    assert_eq!(
        ClientError::Network("connection reset".to_string()).to_string(),
        "Network error: connection reset"
    );
    assert_eq!(
        ClientError::TooManyRedirects.to_string(),
        "Exceeded maximum allowed redirects"
    );
}

#[test]
fn test_proxy_error_carries_status() {
    let error = ClientError::Proxy {
        message: "CONNECT rejected".to_string(),
        status: Some(403),
    };
    match error {
        ClientError::Proxy { status, .. } => assert_eq!(status, Some(403)),
        other => panic!("unexpected variant: {:?}", other),
    }
}

#[test]
fn test_http_status_error() {
    let url = Url::parse("https://example.org/missing").unwrap();
    let error = ClientError::HttpStatus { status: 404, url };
    assert_eq!(
        error.to_string(),
        "404 error for url https://example.org/missing"
    );
}

#[test]
fn test_result_alias() {
    let ok: ClientResult<u8> = Ok(1);
    assert!(ok.is_ok());
}
