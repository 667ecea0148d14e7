use std::time::Duration;

use client_types::{Origin, PoolLimits, Scheme, Timeout};
use url::Url;

#[test]
fn test_pool_limits_defaults() {
    let limits = PoolLimits::default();
    assert_eq!(limits.soft_limit, 10);
    assert_eq!(limits.hard_limit, 100);
    assert_eq!(limits.pool_timeout, Some(Duration::from_secs(5)));
    assert_eq!(limits.keepalive_expiry, Some(Duration::from_secs(5)));
}

#[test]
fn test_timeout_serde_round_trip() {
    let timeout = Timeout {
        connect: Some(Duration::from_millis(250)),
        read: None,
        write: Some(Duration::from_secs(1)),
        pool: Some(Duration::ZERO),
    };
    let json = serde_json::to_string(&timeout).unwrap();
    let back: Timeout = serde_json::from_str(&json).unwrap();
    assert_eq!(back, timeout);
}

#[test]
fn test_origin_display() {
    let url = Url::parse("http://example.com/").unwrap();
    let origin = Origin::from_url(&url).unwrap();
    assert_eq!(origin.to_string(), "http://example.com:80");
    assert_eq!(origin.scheme, Scheme::Http);
}

#[test]
fn test_origins_differ_by_port() {
    let a = Origin::from_url(&Url::parse("http://example.com/").unwrap()).unwrap();
    let b = Origin::from_url(&Url::parse("http://example.com:8080/").unwrap()).unwrap();
    assert_ne!(a, b);
}
