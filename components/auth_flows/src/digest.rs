//! HTTP Digest authentication
//!
//! Implements the challenge-response flow of RFC 7616 with `qop=auth`,
//! session algorithm variants, and a per-nonce request counter shared
//! across every use of one `DigestAuth` value.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use client_errors::{ClientError, ClientResult};
use client_types::{request_target, Request, RequestBody, RequestHead, Response};
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{Extensions, HeaderValue, Method, StatusCode};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tracing::debug;
use url::Url;

/// Hash algorithm named by a Digest challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// MD5 (the default when the challenge names none)
    Md5,
    /// MD5, session variant
    Md5Sess,
    /// SHA-1
    Sha,
    /// SHA-1, session variant
    ShaSess,
    /// SHA-256
    Sha256,
    /// SHA-256, session variant
    Sha256Sess,
    /// SHA-512
    Sha512,
    /// SHA-512, session variant
    Sha512Sess,
}

impl DigestAlgorithm {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "MD5" => Some(Self::Md5),
            "MD5-SESS" => Some(Self::Md5Sess),
            "SHA" => Some(Self::Sha),
            "SHA-SESS" => Some(Self::ShaSess),
            "SHA-256" => Some(Self::Sha256),
            "SHA-256-SESS" => Some(Self::Sha256Sess),
            "SHA-512" => Some(Self::Sha512),
            "SHA-512-SESS" => Some(Self::Sha512Sess),
            _ => None,
        }
    }

    /// The canonical name echoed back in the `Authorization` header
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-SESS",
            Self::Sha => "SHA",
            Self::ShaSess => "SHA-SESS",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-SESS",
            Self::Sha512 => "SHA-512",
            Self::Sha512Sess => "SHA-512-SESS",
        }
    }

    /// Whether this is a `-SESS` variant
    pub fn is_session(&self) -> bool {
        matches!(
            self,
            Self::Md5Sess | Self::ShaSess | Self::Sha256Sess | Self::Sha512Sess
        )
    }

    fn hash_hex(&self, data: &[u8]) -> String {
        match self {
            Self::Md5 | Self::Md5Sess => hex::encode(Md5::digest(data)),
            Self::Sha | Self::ShaSess => hex::encode(Sha1::digest(data)),
            Self::Sha256 | Self::Sha256Sess => hex::encode(Sha256::digest(data)),
            Self::Sha512 | Self::Sha512Sess => hex::encode(Sha512::digest(data)),
        }
    }
}

/// A parsed `WWW-Authenticate: Digest ...` challenge
///
/// These take the form of:
/// `Digest realm="realm@host.com",qop="auth,auth-int",nonce="abc",opaque="xyz"`
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    /// Authentication realm
    pub realm: String,
    /// Server nonce
    pub nonce: String,
    /// Offered quality-of-protection values, verbatim
    pub qop: Option<String>,
    /// Opaque value to echo back, when present
    pub opaque: Option<String>,
    /// Hash algorithm
    pub algorithm: DigestAlgorithm,
}

impl DigestChallenge {
    /// Parse a `WWW-Authenticate` header value
    pub fn parse(header: &str) -> ClientResult<DigestChallenge> {
        let (scheme, fields) = header.split_once(' ').unwrap_or((header, ""));
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(ClientError::Protocol(
                "Header does not start with 'Digest'".to_string(),
            ));
        }

        let mut values: HashMap<String, String> = HashMap::new();
        for field in split_header_list(fields) {
            if let Some((key, value)) = field.split_once('=') {
                values.insert(key.trim().to_string(), unquote(value.trim()));
            }
        }

        let malformed =
            || ClientError::Protocol("Malformed Digest WWW-Authenticate header".to_string());
        let realm = values.get("realm").ok_or_else(malformed)?.clone();
        let nonce = values.get("nonce").ok_or_else(malformed)?.clone();
        let algorithm_name = values
            .get("algorithm")
            .map(String::as_str)
            .unwrap_or("MD5");
        let algorithm = DigestAlgorithm::from_name(algorithm_name).ok_or_else(|| {
            ClientError::Protocol(format!(
                "Unknown digest algorithm '{}'",
                algorithm_name
            ))
        })?;

        Ok(DigestChallenge {
            realm,
            nonce,
            qop: values.get("qop").cloned(),
            opaque: values.get("opaque").cloned(),
            algorithm,
        })
    }
}

/// Split a comma-separated header field list, respecting quoted strings
fn split_header_list(fields: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for character in fields.chars() {
        if escaped {
            current.push(character);
            escaped = false;
            continue;
        }
        match character {
            '\\' if in_quotes => {
                current.push(character);
                escaped = true;
            }
            '"' => {
                current.push(character);
                in_quotes = !in_quotes;
            }
            ',' if !in_quotes => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(character),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Strip surrounding quotes and unescape a quoted-string value
fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut result = String::with_capacity(inner.len());
        let mut escaped = false;
        for character in inner.chars() {
            if escaped {
                result.push(character);
                escaped = false;
            } else if character == '\\' {
                escaped = true;
            } else {
                result.push(character);
            }
        }
        result
    } else {
        value.to_string()
    }
}

/// HTTP Digest credentials
///
/// The per-nonce counter is shared across all uses of one `DigestAuth`
/// value, including requests to distinct origins; the `nc` a server sees
/// reflects every request made with its nonce through these credentials.
pub struct DigestAuth {
    username: String,
    password: String,
    per_nonce_count: Mutex<HashMap<String, u64>>,
}

impl DigestAuth {
    /// Build from a (username, password) pair
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            per_nonce_count: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a server nonce has been used before
    pub fn nonce_seen(&self, nonce: &str) -> bool {
        self.lock_counts().contains_key(nonce)
    }

    /// Increment and return the per-nonce request count with its 8-digit
    /// hex representation
    fn next_nonce_count(&self, nonce: &str) -> (u64, String) {
        let mut counts = self.lock_counts();
        let count = counts.entry(nonce.to_string()).or_insert(0);
        *count += 1;
        (*count, format!("{:08x}", *count))
    }

    fn lock_counts(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.per_nonce_count
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Compute the `Authorization` header for a challenged request
    pub fn build_auth_header(
        &self,
        method: &Method,
        url: &Url,
        challenge: &DigestChallenge,
    ) -> ClientResult<String> {
        let algorithm = challenge.algorithm;
        let a1 = format!("{}:{}:{}", self.username, challenge.realm, self.password);

        let path = request_target(url);
        let a2 = format!("{}:{}", method.as_str(), path);
        let ha2 = algorithm.hash_hex(a2.as_bytes());

        let (count, nc_value) = self.next_nonce_count(&challenge.nonce);
        let cnonce = client_nonce(count, &challenge.nonce);

        let mut ha1 = algorithm.hash_hex(a1.as_bytes());
        if algorithm.is_session() {
            let session = format!("{}:{}:{}", ha1, challenge.nonce, cnonce);
            ha1 = algorithm.hash_hex(session.as_bytes());
        }

        let qop = resolve_qop(challenge.qop.as_deref())?;
        let key_digest = match qop {
            Some(qop) => format!(
                "{}:{}:{}:{}:{}",
                challenge.nonce, nc_value, cnonce, qop, ha2
            ),
            None => format!("{}:{}", challenge.nonce, ha2),
        };
        let response = algorithm.hash_hex(format!("{}:{}", ha1, key_digest).as_bytes());

        // Field order and quoting follow RFC 7616 examples: algorithm, qop,
        // and nc are emitted unquoted.
        let mut fields = vec![
            format!("username=\"{}\"", self.username),
            format!("realm=\"{}\"", challenge.realm),
            format!("nonce=\"{}\"", challenge.nonce),
            format!("uri=\"{}\"", path),
            format!("response=\"{}\"", response),
            format!("algorithm={}", algorithm.name()),
        ];
        if let Some(opaque) = &challenge.opaque {
            fields.push(format!("opaque=\"{}\"", opaque));
        }
        if qop.is_some() {
            fields.push("qop=auth".to_string());
            fields.push(format!("nc={}", nc_value));
            fields.push(format!("cnonce=\"{}\"", cnonce));
        }

        Ok(format!("Digest {}", fields.join(", ")))
    }
}

impl fmt::Debug for DigestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Pick the quality of protection to use from the server's offer
///
/// `auth` wins when offered (possibly in a comma list); a bare `auth-int`
/// offer is recognized but unsupported.
fn resolve_qop(qop: Option<&str>) -> ClientResult<Option<&'static str>> {
    match qop {
        None => Ok(None),
        Some(offer) => {
            let offered: Vec<&str> = offer.split(',').map(str::trim).collect();
            if offered.contains(&"auth") {
                return Ok(Some("auth"));
            }
            if offered == ["auth-int"] {
                return Err(ClientError::NotImplemented(
                    "Digest auth-int support is not yet implemented".to_string(),
                ));
            }
            Err(ClientError::Protocol(format!(
                "Unexpected qop value \"{}\" in digest auth",
                offer
            )))
        }
    }
}

/// First 16 hex chars of SHA1 over nonce count, server nonce, wall clock,
/// and 8 random bytes
fn client_nonce(count: u64, nonce: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(count.to_string().as_bytes());
    hasher.update(nonce.as_bytes());
    let clock = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    hasher.update(clock.as_nanos().to_string().as_bytes());
    hasher.update(rand::random::<[u8; 8]>());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Outcome of one digest flow step
#[derive(Debug)]
pub enum DigestStep {
    /// Re-issue the request with the computed `Authorization` header
    Retry(Request),
    /// The flow is over; this response is the result
    Finished(Response),
}

/// One in-flight digest exchange
///
/// Created per client call. Yields the original request untouched, then
/// reacts to 401 challenges until the server accepts or rejects the
/// credentials.
#[derive(Debug)]
pub struct DigestFlow {
    auth: Arc<DigestAuth>,
    head: RequestHead,
    body: RequestBody,
    num_401_responses: u32,
}

impl DigestFlow {
    /// Start a flow for a request
    ///
    /// Fails with `RequestBodyUnavailable` up front when the body could not
    /// be re-sent for the authenticated retry.
    pub fn begin(auth: Arc<DigestAuth>, request: &Request) -> ClientResult<DigestFlow> {
        if !request.body.can_replay() {
            return Err(ClientError::RequestBodyUnavailable);
        }
        Ok(DigestFlow {
            auth,
            head: request.head(),
            body: request.body.replay()?,
            num_401_responses: 0,
        })
    }

    /// Feed the response to the last sub-request into the flow
    pub fn on_response(&mut self, response: Response) -> ClientResult<DigestStep> {
        if response.status != StatusCode::UNAUTHORIZED
            || !response.headers.contains_key(WWW_AUTHENTICATE)
        {
            self.num_401_responses = 0;
            return Ok(DigestStep::Finished(response));
        }

        let header = response
            .headers
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ClientError::Protocol("Malformed Digest WWW-Authenticate header".to_string())
            })?;
        let challenge = DigestChallenge::parse(header)?;

        self.num_401_responses += 1;
        // A second 401 carrying a nonce we have never answered means the
        // server rejected the credentials themselves.
        if !self.auth.nonce_seen(&challenge.nonce) && self.num_401_responses > 1 {
            return Ok(DigestStep::Finished(response));
        }

        debug!(
            realm = %challenge.realm,
            algorithm = challenge.algorithm.name(),
            "answering digest challenge"
        );

        let header_value =
            self.auth
                .build_auth_header(&self.head.method, &self.head.url, &challenge)?;

        let mut request = Request {
            method: self.head.method.clone(),
            url: self.head.url.clone(),
            headers: self.head.headers.clone(),
            body: self.body.replay()?,
            extensions: Extensions::new(),
        };
        request.prepare()?;
        request.headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&header_value).map_err(|_| {
                ClientError::Protocol("Digest header contains invalid characters".to_string())
            })?,
        );

        Ok(DigestStep::Retry(request))
    }
}
