//! Test fixtures and data generators.

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde_json::{json, Map, Value};

use crate::capabilities::Operation;
use crate::invoke::PaymentDestinationResponse;
use crate::validate::sign_message;

/// Collection of commonly used test fixtures.
pub struct TestFixtures;

impl TestFixtures {
    /// Handle used across tests.
    pub const HANDLE: &'static str = "alice@example.com";

    /// Path prefix of the mock capability endpoints.
    pub const API_PREFIX: &'static str = "/api/v1/bsvalias";

    /// Addresses of the 20-byte hashes produced by [`test_p2pkh_script`].
    pub const P2PKH_ADDRESSES: &'static [&'static str] = &[
        "1111111111111111111114oLvT2",
        "16L5yRNPTuciSgXGHqYwn9N6NeoKqopAu",
    ];
}

/// Deterministic keypair; `seed` must be non-zero.
pub fn test_keypair(seed: u8) -> (SecretKey, PublicKey) {
    let mut bytes = [0u8; 32];
    bytes[31] = seed.max(1);
    bytes[0] = 0x11;
    let secret = match SecretKey::from_slice(&bytes) {
        Ok(secret) => secret,
        Err(e) => panic!("fixture key is valid: {}", e),
    };
    let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
    (secret, public)
}

/// Compressed hex public key of [`test_keypair`].
pub fn test_pubkey_hex(seed: u8) -> String {
    hex::encode(test_keypair(seed).1.serialize())
}

/// A P2PKH output script. Variant 0 pays the all-zero hash, anything else
/// pays `01..=14`.
pub fn test_p2pkh_script(variant: u8) -> String {
    let hash: String = if variant == 0 {
        "00".repeat(20)
    } else {
        (1u8..=20).map(|b| format!("{:02x}", b)).collect()
    };
    format!("76a914{}88ac", hash)
}

/// A destination response whose output is signed by `secret`.
pub fn signed_destination(secret: &SecretKey, output: &str) -> PaymentDestinationResponse {
    let signature = match sign_message(secret, output) {
        Ok(signature) => signature,
        Err(e) => panic!("fixture signing failed: {}", e),
    };
    PaymentDestinationResponse {
        output: output.to_string(),
        signature: Some(signature),
    }
}

/// Builds `/.well-known/bsvalias` documents pointing at a base URL.
#[derive(Clone, Debug)]
pub struct CapabilityDocumentBuilder {
    base_url: String,
    version: String,
    capabilities: Map<String, Value>,
}

impl CapabilityDocumentBuilder {
    /// Start an empty document for endpoints under `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            version: "1.0".to_string(),
            capabilities: Map::new(),
        }
    }

    /// URL template of `operation` under the base URL.
    pub fn template(&self, operation: Operation) -> String {
        let path = match operation {
            Operation::Pki => "id/{alias}@{domain.tld}",
            Operation::PaymentDestination => "address/{alias}@{domain.tld}",
            Operation::PublicProfile => "public-profile/{alias}@{domain.tld}",
            Operation::VerifyPubKey => "verify-pubkey/{alias}@{domain.tld}/{pubkey}",
            Operation::P2pPaymentDestination => "p2p-payment-destination/{alias}@{domain.tld}",
            Operation::SenderValidation => "sender-validation",
        };
        format!("{}{}/{}", self.base_url, TestFixtures::API_PREFIX, path)
    }

    /// Set the `bsvalias` version.
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Advertise `operation` under its alias, or BRFC id when it has none.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        let key = operation.alias().unwrap_or(operation.brfc_id());
        let template = self.template(operation);
        self.capabilities.insert(key.to_string(), Value::String(template));
        self
    }

    /// Advertise PKI.
    pub fn with_pki(self) -> Self {
        self.with_operation(Operation::Pki)
    }

    /// Advertise address resolution.
    pub fn with_payment_destination(self) -> Self {
        self.with_operation(Operation::PaymentDestination)
    }

    /// Advertise the public profile.
    pub fn with_public_profile(self) -> Self {
        self.with_operation(Operation::PublicProfile)
    }

    /// Advertise public key verification.
    pub fn with_verify_pubkey(self) -> Self {
        self.with_operation(Operation::VerifyPubKey)
    }

    /// Advertise P2P payment destinations.
    pub fn with_p2p_destination(self) -> Self {
        self.with_operation(Operation::P2pPaymentDestination)
    }

    /// Advertise the sender validation flag.
    pub fn with_sender_validation(mut self, required: bool) -> Self {
        self.capabilities.insert(
            Operation::SenderValidation.brfc_id().to_string(),
            Value::Bool(required),
        );
        self
    }

    /// Set an arbitrary capability value.
    pub fn with_raw(mut self, key: &str, value: Value) -> Self {
        self.capabilities.insert(key.to_string(), value);
        self
    }

    /// The document as JSON.
    pub fn build(self) -> Value {
        json!({
            "bsvalias": self.version,
            "capabilities": Value::Object(self.capabilities),
        })
    }
}
