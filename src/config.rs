//! Environment-sourced configuration
//!
//! Missing values never stop the proxy from starting. They are reported
//! through [`Config::missing`] and left empty, which degrades rewriting and
//! delivery rather than the listener.

use crate::forward::RewriteRule;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Address the listener binds when `LISTEN_ADDR` is unset
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:2525";

/// Hostname announced in the greeting when `SERVER_HOSTNAME` is unset
pub const DEFAULT_HOSTNAME: &str = "maskrelay.local";

/// Upstream port used when `SMTP_PORT` is unset or unparsable
pub const DEFAULT_UPSTREAM_PORT: u16 = 587;

/// Keys that must be set for forwarding to work
const REQUIRED: [&str; 7] = [
    "SMTP_USERNAME",
    "SMTP_PASSWORD",
    "SMTP_SERVER",
    "SMTP_PORT",
    "FAKE_RCPT_DOMAIN",
    "TRUE_RCPT_LOCAL",
    "TRUE_RCPT_DOMAIN",
];

/// How the connection to the upstream server is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Plaintext connection upgraded with STARTTLS
    #[default]
    StartTls,
    /// TLS from the first byte (port 465 style)
    Wrapper,
    /// No TLS at all
    None,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starttls" => Ok(TlsMode::StartTls),
            "wrapper" | "tls" => Ok(TlsMode::Wrapper),
            "none" | "plain" => Ok(TlsMode::None),
            other => Err(format!("unknown TLS mode {other:?}")),
        }
    }
}

/// Endpoint and credentials of the authenticated upstream server
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub tls: TlsMode,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tls", &self.tls)
            .finish()
    }
}

/// Complete proxy configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub hostname: String,
    /// Read/write deadline on inbound connections; `None` waits forever
    pub client_timeout: Option<Duration>,
    pub upstream: UpstreamConfig,
    pub rule: RewriteRule,
    missing: Vec<&'static str>,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let mut missing: Vec<&'static str> = REQUIRED
            .into_iter()
            .filter(|key| get(*key).is_none())
            .collect();

        let port = match get("SMTP_PORT").map(|port| port.parse::<u16>()) {
            Some(Ok(port)) => port,
            Some(Err(e)) => {
                warn!("Ignoring SMTP_PORT: {e}");
                missing.push("SMTP_PORT");
                DEFAULT_UPSTREAM_PORT
            }
            None => DEFAULT_UPSTREAM_PORT,
        };

        let tls = get("SMTP_TLS")
            .and_then(|mode| {
                mode.parse::<TlsMode>()
                    .map_err(|e| warn!("Ignoring SMTP_TLS: {e}"))
                    .ok()
            })
            .unwrap_or_default();

        let client_timeout = get("CLIENT_TIMEOUT_SECS").and_then(|secs| {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| warn!("Ignoring CLIENT_TIMEOUT_SECS: {e}"))
                .ok()
        });

        Self {
            listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned()),
            hostname: get("SERVER_HOSTNAME").unwrap_or_else(|| DEFAULT_HOSTNAME.to_owned()),
            client_timeout,
            upstream: UpstreamConfig {
                server: get("SMTP_SERVER").unwrap_or_default(),
                port,
                username: get("SMTP_USERNAME").unwrap_or_default(),
                password: get("SMTP_PASSWORD").unwrap_or_default(),
                tls,
            },
            rule: RewriteRule {
                fake_domain: get("FAKE_RCPT_DOMAIN").unwrap_or_default(),
                true_local: get("TRUE_RCPT_LOCAL").unwrap_or_default(),
                true_domain: get("TRUE_RCPT_DOMAIN").unwrap_or_default(),
            },
            missing,
        }
    }

    /// Required keys that were unset, empty or unusable
    pub fn missing(&self) -> &[&'static str] {
        &self.missing
    }
}
