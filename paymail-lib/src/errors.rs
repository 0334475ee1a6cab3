//! Error types for paymail operations.
//!
//! Session-level failures (discovery, document fetch, bad input) are returned
//! as `Err(PaymailError)`. Per-capability failures are carried inside the
//! capability result instead, so one broken endpoint never hides the others.

use std::fmt;

/// Stable numeric codes for callers that render or persist errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PaymailErrorCode {
    /// Handle could not be parsed
    InvalidHandle = 1000,
    /// Domain could not be parsed
    InvalidDomain = 1001,
    /// DNS query failed (not absence of a record)
    Dns = 2000,
    /// Connection or TLS failure
    Unreachable = 2001,
    /// Request timed out
    ConnectionTimeout = 2002,
    /// Discovery document malformed
    CapabilityParse = 3000,
    /// URI template could not be expanded
    Template = 3001,
    /// Capability endpoint returned a non-2xx status
    CapabilityRequest = 3002,
    /// Public key has the wrong format
    InvalidKeyFormat = 4000,
    /// Signature does not match the PKI key
    SignatureMismatch = 4001,
    /// Response field failed validation
    InvalidData = 4002,
    /// Response body could not be decoded
    Serialization = 4003,
    /// BRFC id failed validation
    Brfc = 4004,
    /// Cancelled before completion
    Cancelled = 5000,
    /// Internal/unexpected error
    Internal = 9999,
}

/// Error type for paymail resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymailError {
    /// Input is not a valid `alias@domain` handle.
    InvalidHandle(String),

    /// Input is not a valid DNS hostname.
    InvalidDomain(String),

    /// The SRV query itself failed.
    Dns(String),

    /// The service could not be reached (connect, TLS, certificate).
    Unreachable {
        /// URL or host that was contacted
        target: String,
        /// Underlying error message
        reason: String,
    },

    /// A request exceeded the configured timeout.
    ConnectionTimeout {
        /// Operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The `/.well-known/bsvalias` document is malformed.
    CapabilityParse(String),

    /// A capability URI template could not be expanded.
    Template {
        /// The template as advertised
        template: String,
        /// What went wrong
        reason: String,
    },

    /// A capability endpoint answered with a non-2xx status.
    CapabilityRequest {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// A public key is not a compressed secp256k1 key.
    InvalidKeyFormat(String),

    /// A response signature does not recover the expected key.
    SignatureMismatch(String),

    /// A response field failed validation.
    InvalidData {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A response body could not be decoded.
    Serialization(String),

    /// A BRFC id failed validation.
    Brfc {
        /// The offending id or capability key
        id: String,
        /// Reason for the failure
        reason: String,
    },

    /// The resolution was cancelled.
    Cancelled,

    /// Internal/unexpected error.
    Internal(String),
}

impl PaymailError {
    /// Get the numeric error code.
    pub fn code(&self) -> PaymailErrorCode {
        match self {
            Self::InvalidHandle(_) => PaymailErrorCode::InvalidHandle,
            Self::InvalidDomain(_) => PaymailErrorCode::InvalidDomain,
            Self::Dns(_) => PaymailErrorCode::Dns,
            Self::Unreachable { .. } => PaymailErrorCode::Unreachable,
            Self::ConnectionTimeout { .. } => PaymailErrorCode::ConnectionTimeout,
            Self::CapabilityParse(_) => PaymailErrorCode::CapabilityParse,
            Self::Template { .. } => PaymailErrorCode::Template,
            Self::CapabilityRequest { .. } => PaymailErrorCode::CapabilityRequest,
            Self::InvalidKeyFormat(_) => PaymailErrorCode::InvalidKeyFormat,
            Self::SignatureMismatch(_) => PaymailErrorCode::SignatureMismatch,
            Self::InvalidData { .. } => PaymailErrorCode::InvalidData,
            Self::Serialization(_) => PaymailErrorCode::Serialization,
            Self::Brfc { .. } => PaymailErrorCode::Brfc,
            Self::Cancelled => PaymailErrorCode::Cancelled,
            Self::Internal(_) => PaymailErrorCode::Internal,
        }
    }

    /// Get the error message as an owned String.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns true for network-level failures ("service down" rather than
    /// "service misconfigured").
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Dns(_) | Self::Unreachable { .. } | Self::ConnectionTimeout { .. }
        )
    }

    /// Returns true if this error is potentially recoverable by retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CapabilityRequest { status, .. } => *status == 429 || *status >= 500,
            other => other.is_network(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a template error.
    pub fn template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PaymailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHandle(msg) => write!(f, "invalid paymail handle: {}", msg),
            Self::InvalidDomain(msg) => write!(f, "invalid domain: {}", msg),
            Self::Dns(msg) => write!(f, "dns error: {}", msg),
            Self::Unreachable { target, reason } => {
                write!(f, "{} is unreachable: {}", target, reason)
            }
            Self::ConnectionTimeout {
                operation,
                timeout_ms,
            } => {
                write!(f, "{} timed out after {}ms", operation, timeout_ms)
            }
            Self::CapabilityParse(msg) => write!(f, "invalid capability document: {}", msg),
            Self::Template { template, reason } => {
                write!(f, "cannot expand template {}: {}", template, reason)
            }
            Self::CapabilityRequest { url, status, body } => {
                write!(f, "request to {} failed with status {}: {}", url, status, body)
            }
            Self::InvalidKeyFormat(msg) => write!(f, "invalid public key: {}", msg),
            Self::SignatureMismatch(msg) => write!(f, "signature mismatch: {}", msg),
            Self::InvalidData { field, reason } => {
                write!(f, "invalid {}: {}", field, reason)
            }
            Self::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Self::Brfc { id, reason } => write!(f, "brfc {}: {}", id, reason),
            Self::Cancelled => write!(f, "resolution cancelled"),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for PaymailError {}

impl From<serde_json::Error> for PaymailError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl serde::Serialize for PaymailError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("PaymailError", 2)?;
        state.serialize_field("code", &(self.code() as i32))?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
