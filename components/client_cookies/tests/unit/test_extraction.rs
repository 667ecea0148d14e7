use client_cookies::{CookieJar, SharedCookieJar};
use http::header::{COOKIE, SET_COOKIE};
use http::HeaderMap;
use url::Url;

fn response_headers(values: &[&str]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for value in values {
        headers.append(SET_COOKIE, value.parse().unwrap());
    }
    headers
}

#[test]
fn test_extract_and_apply() {
    let url = Url::parse("http://example.com/app/login").unwrap();
    let mut jar = CookieJar::new();
    jar.extract_from_response(&url, &response_headers(&["session=abc123; Path=/"]));

    let mut request_headers = HeaderMap::new();
    jar.apply_to_request(&url, &mut request_headers);
    assert_eq!(request_headers[COOKIE], "session=abc123");
}

#[test]
fn test_extraction_applies_in_response_order() {
    let url = Url::parse("http://example.com/").unwrap();
    let mut jar = CookieJar::new();
    jar.extract_from_response(
        &url,
        &response_headers(&["token=first; Path=/", "token=second; Path=/"]),
    );
    // The later header wins, as if applied one response at a time.
    assert_eq!(
        jar.get("token", None, None).unwrap().as_deref(),
        Some("second")
    );
}

#[test]
fn test_expired_set_cookie_removes() {
    let url = Url::parse("http://example.com/").unwrap();
    let mut jar = CookieJar::new();
    jar.extract_from_response(&url, &response_headers(&["session=abc; Path=/"]));
    assert_eq!(jar.len(), 1);

    jar.extract_from_response(&url, &response_headers(&["session=abc; Path=/; Max-Age=0"]));
    assert!(jar.is_empty());
}

#[test]
fn test_secure_cookie_not_sent_over_http() {
    let https = Url::parse("https://example.com/").unwrap();
    let http = Url::parse("http://example.com/").unwrap();

    let mut jar = CookieJar::new();
    jar.extract_from_response(&https, &response_headers(&["secret=s3cr3t; Path=/; Secure"]));

    let mut headers = HeaderMap::new();
    jar.apply_to_request(&http, &mut headers);
    assert!(!headers.contains_key(COOKIE));

    jar.apply_to_request(&https, &mut headers);
    assert_eq!(headers[COOKIE], "secret=s3cr3t");
}

#[test]
fn test_host_only_cookie_ignores_subdomains() {
    let url = Url::parse("http://example.com/").unwrap();
    let mut jar = CookieJar::new();
    jar.extract_from_response(&url, &response_headers(&["a=1; Path=/"]));

    let subdomain = Url::parse("http://sub.example.com/").unwrap();
    let mut headers = HeaderMap::new();
    jar.apply_to_request(&subdomain, &mut headers);
    assert!(!headers.contains_key(COOKIE));
}

#[test]
fn test_domain_cookie_matches_subdomains() {
    let url = Url::parse("http://example.com/").unwrap();
    let mut jar = CookieJar::new();
    jar.extract_from_response(
        &url,
        &response_headers(&["a=1; Path=/; Domain=example.com"]),
    );

    let subdomain = Url::parse("http://sub.example.com/").unwrap();
    let mut headers = HeaderMap::new();
    jar.apply_to_request(&subdomain, &mut headers);
    assert_eq!(headers[COOKIE], "a=1");
}

#[test]
fn test_more_specific_path_renders_first() {
    let url = Url::parse("http://example.com/app/section/page").unwrap();
    let mut jar = CookieJar::new();
    jar.extract_from_response(&url, &response_headers(&["outer=1; Path=/"]));
    jar.extract_from_response(&url, &response_headers(&["inner=2; Path=/app/section"]));

    let mut headers = HeaderMap::new();
    jar.apply_to_request(&url, &mut headers);
    assert_eq!(headers[COOKIE], "inner=2; outer=1");
}

#[test]
fn test_existing_cookie_header_wins() {
    let url = Url::parse("http://example.com/").unwrap();
    let mut jar = CookieJar::new();
    jar.set("a", "jar", "example.com", "/");

    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, "a=explicit".parse().unwrap());
    jar.apply_to_request(&url, &mut headers);
    assert_eq!(headers[COOKIE], "a=explicit");
}

#[test]
fn test_shared_jar_round_trip() {
    let url = Url::parse("http://example.com/").unwrap();
    let jar = SharedCookieJar::new();
    jar.extract_from_response(&url, &response_headers(&["s=1; Path=/"]));

    let clone = jar.clone();
    assert_eq!(clone.get("s", None, None).unwrap().as_deref(), Some("1"));
}
