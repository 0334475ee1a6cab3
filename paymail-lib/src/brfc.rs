//! BRFC specification ids.
//!
//! A BRFC id is derived from a specification's title, author and version:
//! the double SHA-256 of the trimmed concatenation, byte-reversed, hex
//! encoded and cut to 12 characters.
//!
//! # Example
//!
//! ```
//! use paymail_lib::brfc::generate_brfc_id;
//!
//! let id = generate_brfc_id("BRFC Specifications", "andy (nChain)", "1");
//! assert_eq!(id, "57dd1f54fc67");
//! ```

use serde::{Deserialize, Serialize};

use crate::capabilities::{CapabilityDocument, KNOWN_ALIASES};
use crate::validate::signature::double_sha256;
use crate::validate::ValidationOutcome;
use crate::{PaymailError, Result};

/// Length of a BRFC id in hex characters.
pub const BRFC_ID_LEN: usize = 12;

/// Derive the BRFC id of a specification.
pub fn generate_brfc_id(title: &str, author: &str, version: &str) -> String {
    let input = format!("{}{}{}", title.trim(), author.trim(), version.trim());
    let mut digest = double_sha256(input.as_bytes());
    digest.reverse();
    let mut id = hex::encode(digest);
    id.truncate(BRFC_ID_LEN);
    id
}

/// Whether `id` has the shape of a BRFC id.
pub fn is_brfc_id(id: &str) -> bool {
    id.len() == BRFC_ID_LEN && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// A BRFC specification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrfcSpec {
    /// 12 character id.
    pub id: String,
    /// Specification title.
    pub title: String,
    /// Author, when known.
    #[serde(default)]
    pub author: Option<String>,
    /// Version, when known.
    #[serde(default)]
    pub version: Option<String>,
    /// Capability alias used in discovery documents.
    #[serde(default)]
    pub alias: Option<String>,
}

impl BrfcSpec {
    /// Create a spec from its id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: None,
            version: None,
            alias: None,
        }
    }

    /// Create a spec whose id is derived from title, author and version.
    pub fn derived(title: &str, author: &str, version: &str) -> Self {
        Self {
            id: generate_brfc_id(title, author, version),
            title: title.trim().to_string(),
            author: Some(author.trim().to_string()),
            version: Some(version.trim().to_string()),
            alias: None,
        }
    }

    /// Set the author and version.
    pub fn with_author(mut self, author: impl Into<String>, version: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self.version = Some(version.into());
        self
    }

    /// Set the capability alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Check the id format and, when author and version are known, that the
    /// id matches the derived one.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(PaymailError::Brfc {
                id: self.id.clone(),
                reason: "title is empty".into(),
            });
        }
        if !is_brfc_id(&self.id) {
            return Err(PaymailError::Brfc {
                id: self.id.clone(),
                reason: "not a 12 character lowercase hex id".into(),
            });
        }
        if let (Some(author), Some(version)) = (&self.author, &self.version) {
            let derived = generate_brfc_id(&self.title, author, version);
            if derived != self.id {
                return Err(PaymailError::Brfc {
                    id: self.id.clone(),
                    reason: format!("derives to {}", derived),
                });
            }
        }
        Ok(())
    }
}

/// Paymail BRFCs known to this crate.
pub fn known_brfcs() -> Vec<BrfcSpec> {
    vec![
        BrfcSpec::new("57dd1f54fc67", "BRFC Specifications").with_author("andy (nChain)", "1"),
        BrfcSpec::new(
            "74524c4d6274",
            "bsvalias Payment Addressing (PayTo Protocol Prefix)",
        )
        .with_author("andy (nChain)", "1"),
        BrfcSpec::new(
            "0036f9b8860f",
            "bsvalias Integration with Simplified Payment Protocol",
        )
        .with_author("andy (nChain)", "1"),
        BrfcSpec::new("f12f968c92d6", "Public Profile (Name & Avatar)")
            .with_author("Ryan X. Charles (Money Button)", "1"),
        BrfcSpec::new("0c4339ef99c2", "Public Key Infrastructure").with_alias("pki"),
        BrfcSpec::new("759684b1a19a", "Payment Addressing (Basic Address Resolution)")
            .with_alias("paymentDestination"),
        BrfcSpec::new("6745385c3fc0", "Sender Validation"),
        BrfcSpec::new("a9f510c16bde", "Verify Public Key Owner"),
        BrfcSpec::new("2a40af698840", "P2P Payment Destination"),
        BrfcSpec::new("5f1323cddf31", "P2P Transactions"),
    ]
}

/// Find a known BRFC by id.
pub fn find_brfc(id: &str) -> Option<BrfcSpec> {
    known_brfcs().into_iter().find(|spec| spec.id == id)
}

/// Case-insensitive search over id, title, author and alias of known BRFCs.
pub fn search_brfcs(term: &str) -> Vec<BrfcSpec> {
    let term = term.trim().to_lowercase();
    known_brfcs()
        .into_iter()
        .filter(|spec| {
            [
                Some(spec.id.as_str()),
                Some(spec.title.as_str()),
                spec.author.as_deref(),
                spec.alias.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&term))
        })
        .collect()
}

/// Check the capability keys of a discovery document.
///
/// Keys must be known aliases, BRFC ids or absolute URLs. Violations are
/// warnings, or errors when `strict` is set.
pub fn validate_brfc(document: &CapabilityDocument, strict: bool) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::ok();
    let report = |outcome: &mut ValidationOutcome, err: PaymailError| {
        if strict {
            outcome.error(err);
        } else {
            outcome.warn(err);
        }
    };

    for key in document.capabilities.keys() {
        if KNOWN_ALIASES.contains(&key.as_str()) || is_url(key) {
            continue;
        }
        if !is_brfc_id(key) {
            report(
                &mut outcome,
                PaymailError::Brfc {
                    id: key.clone(),
                    reason: "capability key is neither a BRFC id nor a known alias".into(),
                },
            );
            continue;
        }
        if let Some(spec) = find_brfc(key) {
            if let Err(e) = spec.validate() {
                report(&mut outcome, e);
            }
        }
    }
    outcome
}

fn is_url(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    (lower.starts_with("https://") || lower.starts_with("http://")) && key.len() > "http://".len()
}
