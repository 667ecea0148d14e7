//! Cookie jar implementation
//!
//! Stores cookies keyed by (domain, path, name). Extraction applies
//! `Set-Cookie` headers in response order; attachment renders a single
//! `Cookie` header with RFC 6265 domain/path/secure matching.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cookie::{Cookie, Expiration};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use time::OffsetDateTime;
use url::Url;

use client_errors::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JarKey {
    domain: String,
    path: String,
    name: String,
}

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    expires: Option<OffsetDateTime>,
    secure: bool,
    // Set-Cookie without a Domain attribute binds to the exact host.
    host_only: bool,
    // Insertion order, for stable header rendering.
    sequence: u64,
}

impl StoredCookie {
    fn is_expired(&self, now: OffsetDateTime) -> bool {
        matches!(self.expires, Some(at) if at <= now)
    }
}

/// Cookie jar for organizing cookies per (domain, path, name)
///
/// Conflicting cookies across domains and paths are kept side by side; an
/// ambiguous `get` by bare name fails with `CookieConflict`.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: HashMap<JarKey, StoredCookie>,
    next_sequence: u64,
}

impl CookieJar {
    /// Create a new empty CookieJar
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired cookies in the jar
    pub fn len(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        self.cookies
            .values()
            .filter(|cookie| !cookie.is_expired(now))
            .count()
    }

    /// Whether the jar holds no unexpired cookies
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a cookie directly
    ///
    /// An empty `domain` stores a cookie that matches any host; `path`
    /// defaults to `/` behaviour when passed as `"/"`.
    pub fn set(&mut self, name: &str, value: &str, domain: &str, path: &str) {
        let key = JarKey {
            domain: domain.to_ascii_lowercase(),
            path: path.to_string(),
            name: name.to_string(),
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.cookies.insert(
            key,
            StoredCookie {
                value: value.to_string(),
                expires: None,
                secure: false,
                host_only: false,
                sequence,
            },
        );
    }

    /// Look up a cookie value by name
    ///
    /// `domain` and `path` narrow the search. When more than one stored
    /// cookie matches, the lookup is ambiguous and fails with
    /// `CookieConflict`.
    pub fn get(
        &self,
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> ClientResult<Option<String>> {
        let now = OffsetDateTime::now_utc();
        let mut found: Option<&StoredCookie> = None;
        for (key, cookie) in &self.cookies {
            if key.name != name || cookie.is_expired(now) {
                continue;
            }
            if let Some(domain) = domain {
                if key.domain != domain.to_ascii_lowercase() {
                    continue;
                }
            }
            if let Some(path) = path {
                if key.path != path {
                    continue;
                }
            }
            if found.is_some() {
                return Err(ClientError::CookieConflict(format!(
                    "multiple cookies with name '{}'",
                    name
                )));
            }
            found = Some(cookie);
        }
        Ok(found.map(|cookie| cookie.value.clone()))
    }

    /// Remove a cookie by name, optionally narrowed by domain and path
    pub fn delete(&mut self, name: &str, domain: Option<&str>, path: Option<&str>) {
        self.cookies.retain(|key, _| {
            if key.name != name {
                return true;
            }
            if let Some(domain) = domain {
                if key.domain != domain.to_ascii_lowercase() {
                    return true;
                }
            }
            if let Some(path) = path {
                if key.path != path {
                    return true;
                }
            }
            false
        });
    }

    /// Remove every cookie
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Apply the `Set-Cookie` headers of a response, in order
    ///
    /// Expired cookies (past `Expires` or non-positive `Max-Age`) are
    /// removed from the jar rather than stored.
    pub fn extract_from_response(&mut self, url: &Url, headers: &HeaderMap) {
        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let now = OffsetDateTime::now_utc();

        for value in headers.get_all(SET_COOKIE) {
            let raw = match value.to_str() {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            let parsed = match Cookie::parse(raw.to_string()) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };

            let (domain, host_only) = match parsed.domain() {
                Some(domain) => (domain.trim_start_matches('.').to_ascii_lowercase(), false),
                None => (host.clone(), true),
            };
            let path = parsed
                .path()
                .map(str::to_string)
                .unwrap_or_else(|| default_path(url));

            let expires = match (parsed.max_age(), parsed.expires()) {
                (Some(max_age), _) => Some(now + max_age),
                (None, Some(Expiration::DateTime(at))) => Some(at),
                _ => None,
            };

            let key = JarKey {
                domain,
                path,
                name: parsed.name().to_string(),
            };

            if matches!(expires, Some(at) if at <= now) {
                self.cookies.remove(&key);
                continue;
            }

            let sequence = self.next_sequence;
            self.next_sequence += 1;
            self.cookies.insert(
                key,
                StoredCookie {
                    value: parsed.value().to_string(),
                    expires,
                    secure: parsed.secure().unwrap_or(false),
                    host_only,
                    sequence,
                },
            );
        }
    }

    /// Attach matching cookies to an outgoing request
    ///
    /// A `Cookie` header already present on the request wins. Matching
    /// cookies are rendered most-specific-path first, insertion order as
    /// the tiebreak.
    pub fn apply_to_request(&self, url: &Url, headers: &mut HeaderMap) {
        if headers.contains_key(COOKIE) {
            return;
        }

        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let path = url.path();
        let is_https = url.scheme() == "https";
        let now = OffsetDateTime::now_utc();

        let mut matched: Vec<(&JarKey, &StoredCookie)> = self
            .cookies
            .iter()
            .filter(|(key, cookie)| {
                !cookie.is_expired(now)
                    && (!cookie.secure || is_https)
                    && domain_matches(&key.domain, cookie.host_only, &host)
                    && path_matches(&key.path, path)
            })
            .collect();

        if matched.is_empty() {
            return;
        }

        matched.sort_by(|(a_key, a), (b_key, b)| {
            b_key
                .path
                .len()
                .cmp(&a_key.path.len())
                .then(a.sequence.cmp(&b.sequence))
        });

        let rendered = matched
            .iter()
            .map(|(key, cookie)| format!("{}={}", key.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");

        if let Ok(value) = HeaderValue::from_str(&rendered) {
            headers.insert(COOKIE, value);
        }
    }
}

/// Check if a stored cookie domain matches the request host
fn domain_matches(cookie_domain: &str, host_only: bool, host: &str) -> bool {
    if cookie_domain.is_empty() {
        return true;
    }
    if host == cookie_domain {
        return true;
    }
    if host_only {
        return false;
    }
    host.ends_with(cookie_domain)
        && host[..host.len() - cookie_domain.len()].ends_with('.')
}

/// Check if a stored cookie path matches the request path
fn path_matches(cookie_path: &str, url_path: &str) -> bool {
    if cookie_path.is_empty() || url_path == cookie_path {
        return true;
    }
    if url_path.starts_with(cookie_path) {
        if cookie_path.ends_with('/') {
            return true;
        }
        if url_path.as_bytes().get(cookie_path.len()) == Some(&b'/') {
            return true;
        }
    }
    false
}

/// The default cookie path for a request URL, per RFC 6265 §5.1.4
fn default_path(url: &Url) -> String {
    let path = url.path();
    if !path.starts_with('/') {
        return "/".to_string();
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

/// A cookie jar shared between the client and the middleware pipeline
///
/// Updates and reads lock for the duration of the cookie operation only;
/// no suspension happens under the lock.
#[derive(Debug, Clone, Default)]
pub struct SharedCookieJar {
    inner: Arc<Mutex<CookieJar>>,
}

impl SharedCookieJar {
    /// Create a new empty shared jar
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cookie directly
    pub fn set(&self, name: &str, value: &str, domain: &str, path: &str) {
        self.lock().set(name, value, domain, path);
    }

    /// Look up a cookie value by name
    pub fn get(
        &self,
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> ClientResult<Option<String>> {
        self.lock().get(name, domain, path)
    }

    /// Apply the `Set-Cookie` headers of a response
    pub fn extract_from_response(&self, url: &Url, headers: &HeaderMap) {
        self.lock().extract_from_response(url, headers);
    }

    /// Attach matching cookies to an outgoing request
    pub fn apply_to_request(&self, url: &Url, headers: &mut HeaderMap) {
        self.lock().apply_to_request(url, headers);
    }

    /// Number of unexpired cookies
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the jar holds no unexpired cookies
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CookieJar> {
        // A poisoned jar lock means a panic mid-update; propagating the
        // panic is the only sound option.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
