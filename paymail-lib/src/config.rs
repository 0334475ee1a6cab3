//! Resolution options.
//!
//! [`ResolveOptions`] is an immutable value handed to every resolve call. It
//! can be built in code, deserialized from any serde format, or overlaid from
//! the environment.
//!
//! # Environment Variables
//!
//! - `PAYMAIL_NAME_SERVER` - DNS server for SRV lookups (`ip` or `ip:port`)
//! - `PAYMAIL_BSVALIAS_VERSION` - expected `bsvalias` document version
//! - `PAYMAIL_TIMEOUT_SECS` - per-request timeout in seconds
//! - `PAYMAIL_MAX_BODY_BYTES` - largest response body accepted from a service
//! - `PAYMAIL_SKIP_DNS_CHECK`, `PAYMAIL_SKIP_SSL_CHECK`, `PAYMAIL_SKIP_SRV_CHECK`,
//!   `PAYMAIL_SKIP_PKI`, `PAYMAIL_SKIP_PUBLIC_PROFILE`, `PAYMAIL_SKIP_TRACING`,
//!   `PAYMAIL_SKIP_BRFC_VALIDATION` - `true`/`1` enables the flag
//! - `PAYMAIL_STRICT_BRFC` - report BRFC violations as errors

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PaymailError, Result};

/// Default DNS server for SRV lookups.
pub const DEFAULT_NAME_SERVER: &str = "8.8.8.8";

/// Default `bsvalias` protocol version.
pub const DEFAULT_BSVALIAS_VERSION: &str = "1.0";

/// Default cap on response bodies, 1 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// URL scheme used to contact the paymail service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// TLS, the only scheme real paymail services use.
    #[default]
    Https,
    /// Plain HTTP, for local test services.
    Http,
}

impl Scheme {
    /// Get the scheme as used in URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Https => "https",
            Self::Http => "http",
        }
    }
}

/// Options controlling discovery, invocation and validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// DNS server used for SRV lookups, `ip` or `ip:port`.
    #[serde(default = "default_name_server")]
    pub name_server: String,

    /// Expected `bsvalias` version of the capability document.
    #[serde(default = "default_bsvalias_version")]
    pub bsvalias_version: String,

    /// SRV service label, without the leading underscore.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// SRV protocol label, without the leading underscore.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Port a well-configured SRV record points to.
    #[serde(default = "default_srv_port")]
    pub expected_port: u16,

    /// Priority a well-configured SRV record carries.
    #[serde(default = "default_srv_priority")]
    pub expected_priority: u16,

    /// Weight a well-configured SRV record carries.
    #[serde(default = "default_srv_weight")]
    pub expected_weight: u16,

    /// Skip validation of the SRV record values.
    #[serde(default)]
    pub skip_dns_check: bool,

    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub skip_ssl_check: bool,

    /// Do not query SRV at all and contact the domain directly.
    #[serde(default)]
    pub skip_srv_check: bool,

    /// Skip the PKI request and signature verification.
    #[serde(default)]
    pub skip_pki: bool,

    /// Skip the public profile request.
    #[serde(default)]
    pub skip_public_profile: bool,

    /// Do not record network traces.
    #[serde(default)]
    pub skip_tracing: bool,

    /// Skip BRFC id validation of the capability document.
    #[serde(default)]
    pub skip_brfc_validation: bool,

    /// Report BRFC violations as errors instead of warnings.
    #[serde(default)]
    pub strict_brfc: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Largest response body read from a service; longer bodies are rejected.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Scheme used for the service endpoint.
    #[serde(default)]
    pub scheme: Scheme,

    /// User agent sent with every HTTP request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_name_server() -> String {
    DEFAULT_NAME_SERVER.to_string()
}

fn default_bsvalias_version() -> String {
    DEFAULT_BSVALIAS_VERSION.to_string()
}

fn default_service_name() -> String {
    "bsvalias".to_string()
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_srv_port() -> u16 {
    443
}

fn default_srv_priority() -> u16 {
    10
}

fn default_srv_weight() -> u16 {
    10
}

fn default_timeout() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_user_agent() -> String {
    format!("paymail-lib/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            name_server: default_name_server(),
            bsvalias_version: default_bsvalias_version(),
            service_name: default_service_name(),
            protocol: default_protocol(),
            expected_port: default_srv_port(),
            expected_priority: default_srv_priority(),
            expected_weight: default_srv_weight(),
            skip_dns_check: false,
            skip_ssl_check: false,
            skip_srv_check: false,
            skip_pki: false,
            skip_public_profile: false,
            skip_tracing: false,
            skip_brfc_validation: false,
            strict_brfc: false,
            timeout_secs: default_timeout(),
            max_body_bytes: default_max_body_bytes(),
            scheme: Scheme::default(),
            user_agent: default_user_agent(),
        }
    }
}

impl ResolveOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `PAYMAIL_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay `PAYMAIL_*` environment variables onto these options.
    ///
    /// Unparseable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Ok(server) = std::env::var("PAYMAIL_NAME_SERVER") {
            self.name_server = server;
        }
        if let Ok(version) = std::env::var("PAYMAIL_BSVALIAS_VERSION") {
            self.bsvalias_version = version;
        }
        if let Ok(timeout) = std::env::var("PAYMAIL_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.timeout_secs = secs;
            }
        }
        if let Ok(limit) = std::env::var("PAYMAIL_MAX_BODY_BYTES") {
            if let Ok(bytes) = limit.parse::<usize>() {
                self.max_body_bytes = bytes;
            }
        }

        let flags: [(&str, &mut bool); 8] = [
            ("PAYMAIL_SKIP_DNS_CHECK", &mut self.skip_dns_check),
            ("PAYMAIL_SKIP_SSL_CHECK", &mut self.skip_ssl_check),
            ("PAYMAIL_SKIP_SRV_CHECK", &mut self.skip_srv_check),
            ("PAYMAIL_SKIP_PKI", &mut self.skip_pki),
            ("PAYMAIL_SKIP_PUBLIC_PROFILE", &mut self.skip_public_profile),
            ("PAYMAIL_SKIP_TRACING", &mut self.skip_tracing),
            ("PAYMAIL_SKIP_BRFC_VALIDATION", &mut self.skip_brfc_validation),
            ("PAYMAIL_STRICT_BRFC", &mut self.strict_brfc),
        ];
        for (name, flag) in flags {
            if let Some(value) = std::env::var(name).ok().and_then(|v| parse_flag(&v)) {
                *flag = value;
            }
        }

        self
    }

    /// Set the DNS server.
    pub fn with_name_server(mut self, server: impl Into<String>) -> Self {
        self.name_server = server.into();
        self
    }

    /// Set the expected `bsvalias` version.
    pub fn with_bsvalias_version(mut self, version: impl Into<String>) -> Self {
        self.bsvalias_version = version.into();
        self
    }

    /// Set the SRV service and protocol labels.
    pub fn with_service(mut self, service: impl Into<String>, protocol: impl Into<String>) -> Self {
        self.service_name = service.into();
        self.protocol = protocol.into();
        self
    }

    /// Set the expected SRV port, priority and weight.
    pub fn with_expected_srv(mut self, port: u16, priority: u16, weight: u16) -> Self {
        self.expected_port = port;
        self.expected_priority = priority;
        self.expected_weight = weight;
        self
    }

    /// Skip validation of SRV record values.
    pub fn with_skip_dns_check(mut self, skip: bool) -> Self {
        self.skip_dns_check = skip;
        self
    }

    /// Accept invalid TLS certificates.
    pub fn with_skip_ssl_check(mut self, skip: bool) -> Self {
        self.skip_ssl_check = skip;
        self
    }

    /// Skip the SRV lookup.
    pub fn with_skip_srv_check(mut self, skip: bool) -> Self {
        self.skip_srv_check = skip;
        self
    }

    /// Skip PKI and signature checks.
    pub fn with_skip_pki(mut self, skip: bool) -> Self {
        self.skip_pki = skip;
        self
    }

    /// Skip the public profile.
    pub fn with_skip_public_profile(mut self, skip: bool) -> Self {
        self.skip_public_profile = skip;
        self
    }

    /// Disable trace recording.
    pub fn with_skip_tracing(mut self, skip: bool) -> Self {
        self.skip_tracing = skip;
        self
    }

    /// Skip BRFC validation.
    pub fn with_skip_brfc_validation(mut self, skip: bool) -> Self {
        self.skip_brfc_validation = skip;
        self
    }

    /// Treat BRFC violations as errors.
    pub fn with_strict_brfc(mut self, strict: bool) -> Self {
        self.strict_brfc = strict;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the response body cap.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Set the endpoint scheme.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The per-request timeout in milliseconds, for error reporting.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_secs.saturating_mul(1000)
    }

    /// The SRV query name for a domain, e.g. `_bsvalias._tcp.example.com`.
    pub fn srv_query_name(&self, domain: &str) -> String {
        format!("_{}._{}.{}", self.service_name, self.protocol, domain)
    }

    /// Parse [`name_server`](Self::name_server) into a socket address.
    ///
    /// A bare IP gets port 53.
    pub fn name_server_addr(&self) -> Result<SocketAddr> {
        let server = self.name_server.trim();
        if let Ok(addr) = server.parse::<SocketAddr>() {
            return Ok(addr);
        }
        server
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, 53))
            .map_err(|_| PaymailError::Dns(format!("invalid name server address: {}", server)))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
