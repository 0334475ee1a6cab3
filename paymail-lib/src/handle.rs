//! Paymail handles and domains.
//!
//! A [`Handle`] is an `alias@domain` address; a [`Target`] is whatever the
//! caller asked to resolve, either a full handle or a bare [`Domain`].
//!
//! # Example
//!
//! ```
//! use paymail_lib::handle::{parse_target, Target};
//!
//! let target = parse_target("  Alice@Example.com ").unwrap();
//! assert!(matches!(target, Target::Handle(_)));
//! assert_eq!(target.domain().as_str(), "example.com");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PaymailError, Result};

/// Domain used for `$alias` HandCash handles.
pub const HANDCASH_DOMAIN: &str = "handcash.io";

/// Domain used for `1alias` RelayX handles.
pub const RELAYX_DOMAIN: &str = "relayx.io";

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// A lowercase DNS hostname.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    /// Parse and normalize a hostname.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().trim_end_matches('.').to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(PaymailError::InvalidDomain("domain is empty".into()));
        }
        if normalized.len() > MAX_DOMAIN_LEN {
            return Err(PaymailError::InvalidDomain(format!(
                "{} exceeds {} characters",
                normalized, MAX_DOMAIN_LEN
            )));
        }

        for label in normalized.split('.') {
            if label.is_empty() {
                return Err(PaymailError::InvalidDomain(format!(
                    "{} contains an empty label",
                    normalized
                )));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(PaymailError::InvalidDomain(format!(
                    "label {} exceeds {} characters",
                    label, MAX_LABEL_LEN
                )));
            }
            if label.starts_with('-') || label.ends_with('-') {
                return Err(PaymailError::InvalidDomain(format!(
                    "label {} starts or ends with a hyphen",
                    label
                )));
            }
            if let Some(c) = label
                .chars()
                .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
            {
                return Err(PaymailError::InvalidDomain(format!(
                    "{} contains invalid character {:?}",
                    normalized, c
                )));
            }
        }

        Ok(Self(normalized))
    }

    /// Get the domain as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Domain {
    type Err = PaymailError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Domain {
    type Error = PaymailError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A paymail address, `alias@domain`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle {
    alias: String,
    domain: Domain,
}

impl Handle {
    /// Parse a handle.
    ///
    /// Whitespace is trimmed, a `mailto:` prefix is removed and the whole
    /// address is lowercased. HandCash (`$alias`) and RelayX (`1alias`)
    /// shorthands are expanded first, see [`convert_handle`].
    pub fn parse(input: &str) -> Result<Self> {
        let converted = convert_handle(input);
        let normalized = normalize(&converted);

        let mut parts = normalized.split('@');
        let (alias, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(alias), Some(domain), None) => (alias, domain),
            _ => {
                return Err(PaymailError::InvalidHandle(format!(
                    "{} must contain exactly one @",
                    input.trim()
                )))
            }
        };

        if alias.is_empty() {
            return Err(PaymailError::InvalidHandle(format!(
                "{} has an empty alias",
                input.trim()
            )));
        }
        if let Some(c) = alias
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || "._+-".contains(*c)))
        {
            return Err(PaymailError::InvalidHandle(format!(
                "alias {} contains invalid character {:?}",
                alias, c
            )));
        }

        let domain = Domain::parse(domain)
            .map_err(|e| PaymailError::InvalidHandle(format!("{}: {}", input.trim(), e)))?;

        Ok(Self {
            alias: alias.to_string(),
            domain,
        })
    }

    /// The part before the `@`.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The part after the `@`.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.alias, self.domain)
    }
}

impl FromStr for Handle {
    type Err = PaymailError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Handle {
    type Error = PaymailError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.to_string()
    }
}

/// What a resolution was asked about.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Target {
    /// A full `alias@domain` handle.
    Handle(Handle),
    /// A bare domain, only discovery and domain-level capabilities apply.
    Domain(Domain),
}

impl Target {
    /// The domain to discover.
    pub fn domain(&self) -> &Domain {
        match self {
            Self::Handle(handle) => handle.domain(),
            Self::Domain(domain) => domain,
        }
    }

    /// The handle, if the target has one.
    pub fn handle(&self) -> Option<&Handle> {
        match self {
            Self::Handle(handle) => Some(handle),
            Self::Domain(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(handle) => handle.fmt(f),
            Self::Domain(domain) => domain.fmt(f),
        }
    }
}

/// Parse resolver input into a handle or bare domain.
pub fn parse_target(input: &str) -> Result<Target> {
    let converted = convert_handle(input);
    if converted.contains('@') {
        Handle::parse(&converted).map(Target::Handle)
    } else {
        Domain::parse(&normalize(&converted)).map(Target::Domain)
    }
}

/// Expand wallet shorthands into full handles.
///
/// `$alias` becomes `alias@handcash.io` and `1alias` becomes
/// `alias@relayx.io`. Anything else is returned trimmed but unchanged.
pub fn convert_handle(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.contains('@') {
        return trimmed.to_string();
    }

    if let Some(alias) = trimmed.strip_prefix('$') {
        if !alias.is_empty() {
            return format!("{}@{}", alias, HANDCASH_DOMAIN);
        }
    }
    if let Some(alias) = trimmed.strip_prefix('1') {
        // a bare domain such as 1example.com is left alone
        if !alias.is_empty() && !alias.contains('.') {
            return format!("{}@{}", alias, RELAYX_DOMAIN);
        }
    }

    trimmed.to_string()
}

fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    let without_scheme = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("mailto:") => &trimmed[7..],
        _ => trimmed,
    };
    without_scheme.trim().to_ascii_lowercase()
}
