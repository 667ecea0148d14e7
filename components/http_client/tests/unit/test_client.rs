use http::header::{ACCEPT, AUTHORIZATION, COOKIE, LOCATION, SET_COOKIE, USER_AGENT};
use http::StatusCode;
use http_client::{
    Client, ClientError, Credentials, HstsPreload, MockResponse, MockTransport,
};
use url::Url;

fn echo_transport() -> MockTransport {
    MockTransport::new(|_head, _body| Ok(MockResponse::new(StatusCode::OK).body("ok")))
}

#[tokio::test]
async fn test_default_headers_added_when_absent() {
    let transport = MockTransport::new(|head, _body| {
        assert_eq!(head.headers[ACCEPT], "*/*");
        assert_eq!(head.headers["accept-encoding"], "gzip, deflate");
        assert_eq!(head.headers["connection"], "keep-alive");
        assert!(head.headers[USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("http-client/"));
        assert_eq!(head.headers["host"], "testserver");
        Ok(MockResponse::new(StatusCode::OK))
    });

    let client = Client::builder().transport(transport).build().unwrap();
    client.get("http://testserver/").send().await.unwrap();
}

#[tokio::test]
async fn test_per_call_header_overrides_default() {
    let transport = MockTransport::new(|head, _body| {
        assert_eq!(head.headers[USER_AGENT], "custom-agent");
        Ok(MockResponse::new(StatusCode::OK))
    });

    let client = Client::builder().transport(transport).build().unwrap();
    client
        .get("http://testserver/")
        .header("user-agent", "custom-agent")
        .send()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_params_merge_client_then_call() {
    let transport = MockTransport::new(|head, _body| {
        assert_eq!(head.url.query(), Some("tenant=acme&page=2"));
        Ok(MockResponse::new(StatusCode::OK))
    });

    let client = Client::builder()
        .param("tenant", "acme")
        .transport(transport)
        .build()
        .unwrap();
    client
        .get("http://testserver/list")
        .param("page", "2")
        .send()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_base_url_join() {
    let transport = MockTransport::new(|head, _body| {
        assert_eq!(head.url.as_str(), "http://testserver/api/v1/items");
        Ok(MockResponse::new(StatusCode::OK))
    });

    let client = Client::builder()
        .base_url(Url::parse("http://testserver/api/v1/").unwrap())
        .transport(transport)
        .build()
        .unwrap();
    client.get("items").send().await.unwrap();
}

#[tokio::test]
async fn test_hsts_upgrade_elides_default_port() {
    let transport = MockTransport::new(|head, _body| {
        assert_eq!(head.url.scheme(), "https");
        assert_eq!(head.url.port(), None);
        Ok(MockResponse::new(StatusCode::OK))
    });

    let client = Client::builder()
        .hsts_preload(HstsPreload::new(["secure.example".to_string()]))
        .transport(transport)
        .build()
        .unwrap();
    client.get("http://secure.example:80/").send().await.unwrap();
}

#[tokio::test]
async fn test_hsts_upgrade_preserves_custom_port() {
    let transport = MockTransport::new(|head, _body| {
        assert_eq!(head.url.scheme(), "https");
        assert_eq!(head.url.port(), Some(8080));
        Ok(MockResponse::new(StatusCode::OK))
    });

    let client = Client::builder()
        .hsts_preload(HstsPreload::new(["secure.example".to_string()]))
        .transport(transport)
        .build()
        .unwrap();
    client
        .get("http://secure.example:8080/")
        .send()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cookies_persist_across_calls() {
    let transport = MockTransport::new(|head, _body| {
        if head.url.path() == "/login" {
            assert!(!head.headers.contains_key(COOKIE));
            Ok(MockResponse::new(StatusCode::OK).header(SET_COOKIE, "session=abc123; Path=/"))
        } else {
            assert_eq!(head.headers[COOKIE], "session=abc123");
            Ok(MockResponse::new(StatusCode::OK))
        }
    });

    let client = Client::builder().transport(transport).build().unwrap();
    client.get("http://testserver/login").send().await.unwrap();
    assert_eq!(
        client.cookies().get("session", None, None).unwrap().as_deref(),
        Some("abc123")
    );
    client.get("http://testserver/account").send().await.unwrap();
}

#[tokio::test]
async fn test_head_does_not_follow_redirects_by_default() {
    let transport = MockTransport::new(|head, _body| {
        if head.url.path() == "/" {
            Ok(MockResponse::new(StatusCode::FOUND).header(LOCATION, "/next"))
        } else {
            Ok(MockResponse::new(StatusCode::OK))
        }
    });

    let client = Client::builder().transport(transport).build().unwrap();

    let response = client.head("http://testserver/").send().await.unwrap();
    assert_eq!(response.status, StatusCode::FOUND);

    // GET follows by default; HEAD can opt in.
    let response = client.get("http://testserver/").send().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    let response = client
        .head("http://testserver/")
        .allow_redirects(true)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_client_level_auth_applies() {
    let transport = MockTransport::new(|head, _body| {
        assert_eq!(
            head.headers[AUTHORIZATION].to_str().unwrap(),
            "Basic dG9tY2hyaXN0aWU6cGFzc3dvcmQxMjM="
        );
        Ok(MockResponse::new(StatusCode::OK))
    });

    let client = Client::builder()
        .auth(Credentials::basic("tomchristie", "password123"))
        .transport(transport)
        .build()
        .unwrap();
    client.get("http://testserver/").send().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_scheme_rejected() {
    let client = Client::builder()
        .transport(echo_transport())
        .build()
        .unwrap();
    let error = client.get("ftp://testserver/").send().await.unwrap_err();
    assert!(matches!(error, ClientError::UnsupportedScheme(_)));
}

#[tokio::test]
async fn test_response_content_available_after_send() {
    let client = Client::builder()
        .transport(echo_transport())
        .build()
        .unwrap();
    let response = client.get("http://testserver/").send().await.unwrap();
    assert_eq!(response.content().unwrap().as_ref(), b"ok");
    assert_eq!(response.text().unwrap(), "ok");
    response.raise_for_status().unwrap();
}

#[tokio::test]
async fn test_raise_for_status_carries_url() {
    let transport =
        MockTransport::new(|_head, _body| Ok(MockResponse::new(StatusCode::NOT_FOUND)));
    let client = Client::builder().transport(transport).build().unwrap();
    let response = client.get("http://testserver/missing").send().await.unwrap();
    match response.raise_for_status().unwrap_err() {
        ClientError::HttpStatus { status, url } => {
            assert_eq!(status, 404);
            assert_eq!(url.path(), "/missing");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_blocking_client_round_trip() {
    let builder = Client::builder().transport(echo_transport());
    let client = http_client::blocking::Client::new(builder).unwrap();
    let response = client.get("http://testserver/").unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text().unwrap(), "ok");
    client.close();
}
