//! Test utilities for paymail resolution.
//!
//! - Deterministic secp256k1 keys and signed destination responses
//! - A capability document builder pointing at a mock server
//! - Assertion helpers for capability outcomes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paymail_lib::test_utils::{test_keypair, CapabilityDocumentBuilder};
//!
//! let (secret, public) = test_keypair(1);
//! let document = CapabilityDocumentBuilder::new(&server.uri())
//!     .with_pki()
//!     .with_payment_destination()
//!     .build();
//! ```

mod assertions;
mod fixtures;

pub use fixtures::{
    signed_destination, test_keypair, test_p2pkh_script, test_pubkey_hex,
    CapabilityDocumentBuilder, TestFixtures,
};

pub use assertions::{assert_failed, assert_not_supported, assert_skipped, assert_success};
