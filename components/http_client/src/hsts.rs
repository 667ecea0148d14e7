//! HSTS preload lookups
//!
//! Hosts on the preload list must never be fetched over cleartext http;
//! the client rewrites such URLs to https before dispatch. The list is a
//! read-only dependency injected at construction so the core stays
//! deterministic and testable.

use std::collections::HashSet;

/// A set of hosts whose `http://` URLs are upgraded to `https://`
///
/// Matching covers the host itself and any parent domain on the list, so
/// an entry for `example.org` also upgrades `www.example.org`.
#[derive(Debug, Clone, Default)]
pub struct HstsPreload {
    hosts: HashSet<String>,
}

impl HstsPreload {
    /// An empty list that upgrades nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from an explicit host list
    pub fn new(hosts: impl IntoIterator<Item = String>) -> Self {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| host.to_ascii_lowercase())
                .collect(),
        }
    }

    /// A minimal built-in table of well-known preloaded domains
    ///
    /// The full Chromium preload list is hundreds of thousands of entries;
    /// applications wanting it can load it and pass it to `new`.
    pub fn builtin() -> Self {
        Self::new(
            [
                "hstspreload.org",
                "wikipedia.org",
                "wikimedia.org",
                "github.io",
                "pages.dev",
            ]
            .into_iter()
            .map(str::to_string),
        )
    }

    /// Whether the host (or a parent domain) is on the list
    pub fn contains(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.hosts.contains(&host) {
            return true;
        }
        // Walk parent domains: a.b.example.org matches an example.org entry.
        let mut rest = host.as_str();
        while let Some(index) = rest.find('.') {
            rest = &rest[index + 1..];
            if self.hosts.contains(rest) {
                return true;
            }
        }
        false
    }
}
