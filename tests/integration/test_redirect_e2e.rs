//! Redirect chains over real sockets

use http_client::{Client, ClientError};

use crate::test_helpers::{plain_response, response_with_headers, spawn_server};

#[tokio::test]
async fn test_302_with_cookie_carry_and_history() {
    let addr = spawn_server(|request| match request.target.as_str() {
        "/" => response_with_headers(
            302,
            "Found",
            &[("Location", "/next"), ("Set-Cookie", "session=abc123; Path=/")],
            "",
        ),
        "/next" => {
            assert_eq!(request.method, "GET");
            // Cookies extracted from the 302 ride along to the next hop.
            assert_eq!(request.header("cookie"), Some("session=abc123"));
            plain_response(200, "OK", "landed")
        }
        other => panic!("unexpected target {}", other),
    })
    .await;

    let client = Client::builder().build().unwrap();
    let response = client
        .get(&format!("http://{}/", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.history.len(), 1);
    assert_eq!(response.history[0].status, 302);
    assert_eq!(response.text().unwrap(), "landed");
    client.close().await;
}

#[tokio::test]
async fn test_redirect_chain_history_in_order() {
    let addr = spawn_server(|request| match request.target.as_str() {
        "/a" => response_with_headers(301, "Moved Permanently", &[("Location", "/b")], ""),
        "/b" => response_with_headers(302, "Found", &[("Location", "/c")], ""),
        "/c" => response_with_headers(307, "Temporary Redirect", &[("Location", "/final")], ""),
        "/final" => plain_response(200, "OK", "end"),
        other => panic!("unexpected target {}", other),
    })
    .await;

    let client = Client::builder().build().unwrap();
    let response = client
        .get(&format!("http://{}/a", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    let statuses: Vec<u16> = response
        .history
        .iter()
        .map(|hop| hop.status.as_u16())
        .collect();
    assert_eq!(statuses, vec![301, 302, 307]);
    client.close().await;
}

#[tokio::test]
async fn test_max_redirects_enforced() {
    let addr = spawn_server(|request| {
        let hop: u32 = request.target[1..].parse().unwrap_or(0);
        response_with_headers(302, "Found", &[("Location", &format!("/{}", hop + 1))], "")
    })
    .await;

    let client = Client::builder().max_redirects(3).build().unwrap();
    let error = client
        .get(&format!("http://{}/0", addr))
        .send()
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::TooManyRedirects));
    client.close().await;
}
