//! The `/.well-known/bsvalias` capability document.
//!
//! A paymail service advertises what it supports as a JSON object:
//!
//! ```json
//! {
//!   "bsvalias": "1.0",
//!   "capabilities": {
//!     "pki": "https://bsvalias.example.com/{alias}@{domain.tld}/id",
//!     "paymentDestination": "https://bsvalias.example.com/address/{alias}@{domain.tld}",
//!     "6745385c3fc0": false
//!   }
//! }
//! ```
//!
//! Keys are either short aliases or 12 character BRFC ids. Values are URI
//! templates or boolean flags; both are typed once here at parse time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PaymailError, Result};

mod fetch;

pub use fetch::fetch_capabilities;

/// Capability keys that are aliases rather than BRFC ids.
pub const KNOWN_ALIASES: &[&str] = &["pki", "paymentDestination"];

/// An operation the resolver can perform against a paymail service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Fetch the identity public key.
    Pki,
    /// Resolve a payment output script.
    PaymentDestination,
    /// Fetch name and avatar.
    PublicProfile,
    /// Ask whether a public key belongs to the handle.
    VerifyPubKey,
    /// Whether the service requires sender signatures.
    SenderValidation,
    /// Request P2P payment outputs for an amount.
    P2pPaymentDestination,
}

impl Operation {
    /// All operations, in invocation order.
    pub const ALL: [Operation; 6] = [
        Operation::Pki,
        Operation::PaymentDestination,
        Operation::PublicProfile,
        Operation::VerifyPubKey,
        Operation::SenderValidation,
        Operation::P2pPaymentDestination,
    ];

    /// Short capability alias, if the protocol defines one.
    pub fn alias(&self) -> Option<&'static str> {
        match self {
            Self::Pki => Some("pki"),
            Self::PaymentDestination => Some("paymentDestination"),
            _ => None,
        }
    }

    /// BRFC id of the capability.
    pub fn brfc_id(&self) -> &'static str {
        match self {
            Self::Pki => "0c4339ef99c2",
            Self::PaymentDestination => "759684b1a19a",
            Self::PublicProfile => "f12f968c92d6",
            Self::VerifyPubKey => "a9f510c16bde",
            Self::SenderValidation => "6745385c3fc0",
            Self::P2pPaymentDestination => "2a40af698840",
        }
    }

    /// Whether the operation needs an `alias@domain` handle.
    pub fn requires_handle(&self) -> bool {
        !matches!(self, Self::SenderValidation)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pki => "pki",
            Self::PaymentDestination => "paymentDestination",
            Self::PublicProfile => "publicProfile",
            Self::VerifyPubKey => "verifyPubKey",
            Self::SenderValidation => "senderValidation",
            Self::P2pPaymentDestination => "p2pPaymentDestination",
        };
        f.write_str(name)
    }
}

/// A typed capability value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Capability {
    /// A URI template.
    Endpoint(String),
    /// A boolean flag.
    Flag(bool),
    /// Not advertised.
    Unsupported,
}

/// Parsed capability document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDocument {
    /// The `bsvalias` version field.
    pub version: String,
    /// Capabilities by key, as advertised.
    pub capabilities: BTreeMap<String, Capability>,
    /// Keys whose values were neither strings nor booleans.
    pub ignored: Vec<String>,
}

impl CapabilityDocument {
    /// Parse a discovery document body.
    pub fn parse(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| PaymailError::CapabilityParse(format!("body is not JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Build a document from already decoded JSON.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(PaymailError::CapabilityParse(
                "document is not a JSON object".into(),
            ));
        };

        let version = match root.remove("bsvalias") {
            Some(Value::String(version)) => version,
            Some(_) => {
                return Err(PaymailError::CapabilityParse(
                    "bsvalias field is not a string".into(),
                ))
            }
            None => {
                return Err(PaymailError::CapabilityParse(
                    "bsvalias field is missing".into(),
                ))
            }
        };

        let mut capabilities = BTreeMap::new();
        let mut ignored = Vec::new();
        match root.remove("capabilities") {
            Some(Value::Object(entries)) => {
                for (key, value) in entries {
                    match value {
                        Value::String(template) => {
                            capabilities.insert(key, Capability::Endpoint(template));
                        }
                        Value::Bool(flag) => {
                            capabilities.insert(key, Capability::Flag(flag));
                        }
                        _ => ignored.push(key),
                    }
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => {
                return Err(PaymailError::CapabilityParse(
                    "capabilities field is not an object".into(),
                ))
            }
        }

        Ok(Self {
            version,
            capabilities,
            ignored,
        })
    }

    /// Look up an operation by alias, then by BRFC id.
    pub fn lookup(&self, operation: Operation) -> Capability {
        operation
            .alias()
            .and_then(|alias| self.capabilities.get(alias))
            .or_else(|| self.capabilities.get(operation.brfc_id()))
            .cloned()
            .unwrap_or(Capability::Unsupported)
    }

    /// Look up a raw capability key.
    pub fn get(&self, key: &str) -> Capability {
        self.capabilities
            .get(key)
            .cloned()
            .unwrap_or(Capability::Unsupported)
    }

    /// Whether the service advertises the operation.
    pub fn supports(&self, operation: Operation) -> bool {
        !matches!(self.lookup(operation), Capability::Unsupported)
    }
}
