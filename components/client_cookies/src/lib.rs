//! client_cookies component
//!
//! Cookie persistence for the client: a jar keyed by (domain, path, name)
//! with RFC 6265 extraction from `Set-Cookie` headers and attachment to
//! outgoing requests.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod jar;

pub use jar::{CookieJar, SharedCookieJar};
