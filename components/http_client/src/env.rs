//! Environment discovery
//!
//! Pure functions over the process environment: proxy variables and netrc
//! credentials. Consulted once at client construction when `trust_env` is
//! enabled, never during request dispatch.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use tracing::debug;
use url::Url;

/// Proxy URLs configured through the environment
///
/// `HTTP_PROXY`, `HTTPS_PROXY` and `ALL_PROXY` (upper- or lowercase) map
/// to the proxy keys `http`, `https` and `all`.
pub fn environment_proxies() -> HashMap<String, Url> {
    let mut proxies = HashMap::new();
    for (variable, key) in [
        ("HTTP_PROXY", "http"),
        ("HTTPS_PROXY", "https"),
        ("ALL_PROXY", "all"),
    ] {
        let value = env::var(variable).or_else(|_| env::var(variable.to_ascii_lowercase()));
        if let Ok(value) = value {
            if value.is_empty() {
                continue;
            }
            match Url::parse(&value) {
                Ok(url) => {
                    proxies.insert(key.to_string(), url);
                }
                Err(error) => debug!(%variable, %error, "ignoring unparsable proxy variable"),
            }
        }
    }
    proxies
}

/// Hosts exempted from proxying through `NO_PROXY`
pub fn no_proxy_hosts() -> Vec<String> {
    let value = env::var("NO_PROXY")
        .or_else(|_| env::var("no_proxy"))
        .unwrap_or_default();
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

/// Parsed netrc credentials
///
/// Looked up by authority (`host:port` first, bare host second); the
/// `default` entry answers anything else.
#[derive(Debug, Clone, Default)]
pub struct Netrc {
    machines: HashMap<String, (String, String)>,
    default: Option<(String, String)>,
}

impl Netrc {
    /// Load from `$NETRC`, falling back to `~/.netrc`
    pub fn from_env() -> Option<Netrc> {
        let path = match env::var_os("NETRC") {
            Some(path) => PathBuf::from(path),
            None => {
                let home = env::var_os("HOME")?;
                PathBuf::from(home).join(".netrc")
            }
        };
        let content = std::fs::read_to_string(&path).ok()?;
        debug!(path = %path.display(), "loaded netrc");
        Some(Self::parse(&content))
    }

    /// Parse netrc file content
    ///
    /// Recognizes `machine`, `login`, `password` and `default` tokens;
    /// `macdef` blocks are skipped.
    pub fn parse(content: &str) -> Netrc {
        let mut netrc = Netrc::default();
        let mut current: Option<String> = None;
        let mut is_default = false;
        let mut login = String::new();
        let mut password = String::new();
        let mut in_macdef = false;

        let mut store = |machine: &mut Option<String>,
                         is_default: &mut bool,
                         login: &mut String,
                         password: &mut String,
                         netrc: &mut Netrc| {
            if !login.is_empty() || !password.is_empty() {
                let entry = (std::mem::take(login), std::mem::take(password));
                if *is_default {
                    netrc.default = Some(entry);
                } else if let Some(machine) = machine.take() {
                    netrc.machines.insert(machine, entry);
                }
            }
            *is_default = false;
        };

        for line in content.lines() {
            if in_macdef {
                if line.trim().is_empty() {
                    in_macdef = false;
                }
                continue;
            }
            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                match token {
                    "machine" => {
                        store(&mut current, &mut is_default, &mut login, &mut password, &mut netrc);
                        current = tokens.next().map(|name| name.to_ascii_lowercase());
                    }
                    "default" => {
                        store(&mut current, &mut is_default, &mut login, &mut password, &mut netrc);
                        is_default = true;
                    }
                    "login" => {
                        if let Some(value) = tokens.next() {
                            login = value.to_string();
                        }
                    }
                    "password" => {
                        if let Some(value) = tokens.next() {
                            password = value.to_string();
                        }
                    }
                    "macdef" => {
                        in_macdef = true;
                        break;
                    }
                    _ => {}
                }
            }
        }
        store(&mut current, &mut is_default, &mut login, &mut password, &mut netrc);
        netrc
    }

    /// Credentials for an authority: `host:port` first, then bare host,
    /// then the default entry
    pub fn lookup(&self, host: &str, port: u16) -> Option<(String, String)> {
        let authority = format!("{}:{}", host.to_ascii_lowercase(), port);
        self.machines
            .get(&authority)
            .or_else(|| self.machines.get(&host.to_ascii_lowercase()))
            .or(self.default.as_ref())
            .cloned()
    }

    /// Whether the file defined any credentials at all
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty() && self.default.is_none()
    }
}
