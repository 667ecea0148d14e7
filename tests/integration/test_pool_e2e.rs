//! Pool limits and lease accounting through the full client

use std::time::Duration;

use client_types::{PoolLimits, Timeout};
use http_client::{Client, ClientError};

use crate::test_helpers::{plain_response, spawn_server};

#[tokio::test]
async fn test_hard_limit_contention_and_recovery() {
    let addr = spawn_server(|_request| plain_response(200, "OK", "slot")).await;

    let limits = PoolLimits {
        hard_limit: 1,
        pool_timeout: Some(Duration::from_micros(100)),
        ..PoolLimits::default()
    };
    let client = Client::builder().pool_limits(limits).build().unwrap();
    let url = format!("http://{}/", addr);

    // While the first response is streaming, the single slot stays leased.
    let mut streaming = client.get(&url).stream().await.unwrap();

    let error = client.get(&url).send().await.unwrap_err();
    assert!(matches!(error, ClientError::PoolTimeout));

    // Draining the first response releases the lease; the next call works.
    streaming.read().await.unwrap();
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status, 200);
    client.close().await;
}

#[tokio::test]
async fn test_sequential_calls_reuse_one_connection() {
    let addr = spawn_server(|_request| plain_response(200, "OK", "hit")).await;

    let client = Client::builder().build().unwrap();
    let url = format!("http://{}/", addr);
    for _ in 0..3 {
        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status, 200);
    }
    client.close().await;
}

#[tokio::test]
async fn test_per_call_timeout_override() {
    let addr = spawn_server(|_request| plain_response(200, "OK", "fast")).await;

    let client = Client::builder().build().unwrap();
    let response = client
        .get(&format!("http://{}/", addr))
        .timeout(Timeout::all(Duration::from_secs(30)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    client.close().await;
}
