//! Paymail library.
//!
//! Resolves and validates paymail addresses (`alias@domain.tld`). The crate
//! stays stateless: every resolution discovers the service, fetches its
//! capability document and invokes capabilities from scratch, and delegates
//! DNS and trace collection to callers through traits.
//!
//! # Features
//!
//! - **Discovery**: SRV lookup of `_bsvalias._tcp.<domain>` with RFC 2782
//!   selection and fallback to `https://<domain>:443`
//! - **Capabilities**: typed parsing of `/.well-known/bsvalias`
//! - **Invocation**: PKI, address resolution, public profile, public key
//!   verification and P2P payment destinations, run concurrently
//! - **Validation**: output scripts, key formats, signed messages, BRFC ids
//!   and SRV values as independent stages
//!
//! # Example
//!
//! ```rust,ignore
//! use paymail_lib::prelude::*;
//!
//! let client = PaymailClient::new(ResolveOptions::from_env());
//! let result = client
//!     .resolve("alice@example.com", &CapabilityRequest::default())
//!     .await?;
//!
//! if let Some(Payload::Pki(pki)) = result.get(Operation::Pki).and_then(|r| r.payload()) {
//!     println!("identity key: {}", pki.pubkey);
//! }
//! for (operation, error) in result.errors() {
//!     eprintln!("{} failed: {}", operation, error);
//! }
//! ```

pub mod brfc;
pub mod cancel;
pub mod capabilities;
pub mod config;
pub mod dns;
pub mod errors;
pub mod handle;
pub mod http;
pub mod invoke;
pub mod prelude;
pub mod session;
pub mod trace;
pub mod validate;

/// Test utilities for paymail testing.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cancel::CancelToken;
pub use capabilities::{Capability, CapabilityDocument, Operation};
pub use config::{ResolveOptions, Scheme};
pub use errors::{PaymailError, PaymailErrorCode};
pub use handle::{convert_handle, parse_target, Domain, Handle, Target};
pub use session::{
    CapabilityRequest, CapabilityResult, Outcome, PaymailClient, ResolutionResult, SkipReason,
};

/// Common result alias for paymail operations.
pub type Result<T> = std::result::Result<T, PaymailError>;
