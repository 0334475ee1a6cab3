//! Response validation stages.
//!
//! Each stage is a pure function of a decoded payload and a
//! [`ValidationContext`] returning a [`ValidationOutcome`]. The session runs
//! the stages that apply; any error fails the capability, warnings are
//! attached to its result.

use secp256k1::PublicKey;
use serde::Serialize;

use crate::capabilities::CapabilityDocument;
use crate::config::ResolveOptions;
use crate::dns::SrvRecord;
use crate::handle::Handle;
use crate::invoke::{
    P2pDestinationResponse, PaymentDestinationResponse, PkiResponse, PublicProfile,
    VerifyPubKeyResponse,
};
use crate::PaymailError;

pub mod script;
pub mod signature;

pub use script::{inspect_script, ScriptError, ScriptInfo, ScriptKind};
pub use signature::{parse_pubkey, recover_pubkey, sign_message, verify_message};

/// Inputs shared by the validation stages of one resolution.
#[derive(Clone, Debug, Default)]
pub struct ValidationContext {
    /// Handle being resolved.
    pub handle: Option<Handle>,
    /// Identity key from a successful PKI lookup.
    pub pki_key: Option<PublicKey>,
    /// Whether response signatures are checked.
    pub verify_signatures: bool,
    /// Key the caller asked to verify.
    pub expected_pubkey: Option<String>,
}

impl ValidationContext {
    /// Context for `handle` with options applied.
    pub fn new(handle: Option<Handle>, options: &ResolveOptions) -> Self {
        Self {
            handle,
            pki_key: None,
            verify_signatures: !options.skip_pki,
            expected_pubkey: None,
        }
    }

    /// Attach the PKI key.
    pub fn with_pki_key(mut self, key: Option<PublicKey>) -> Self {
        self.pki_key = key;
        self
    }

    /// Attach the key being verified.
    pub fn with_expected_pubkey(mut self, pubkey: Option<String>) -> Self {
        self.expected_pubkey = pubkey;
        self
    }
}

/// Errors and warnings produced by a stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    /// Problems that fail the capability.
    pub errors: Vec<PaymailError>,
    /// Problems worth reporting that do not fail it.
    pub warnings: Vec<PaymailError>,
}

impl ValidationOutcome {
    /// An empty outcome.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Returns true if there are no errors.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record an error.
    pub fn error(&mut self, error: PaymailError) {
        self.errors.push(error);
    }

    /// Record a warning.
    pub fn warn(&mut self, warning: PaymailError) {
        tracing::warn!(%warning, "validation warning");
        self.warnings.push(warning);
    }
}

/// Check a PKI response: key format, then the echoed handle.
pub fn validate_pki(pki: &PkiResponse, ctx: &ValidationContext) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::ok();
    if let Err(e) = parse_pubkey(&pki.pubkey) {
        outcome.error(e);
    }
    check_handle_echo(&pki.handle, ctx, &mut outcome);
    outcome
}

/// Check an address resolution response.
///
/// The output script must be well formed. A signature, when present and
/// signature checks are on, must recover the PKI key.
pub fn validate_destination(
    destination: &PaymentDestinationResponse,
    ctx: &ValidationContext,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::ok();
    check_script("output", &destination.output, &mut outcome);

    let Some(signature) = destination.signature.as_deref().filter(|s| !s.is_empty()) else {
        return outcome;
    };
    if !ctx.verify_signatures {
        return outcome;
    }
    match &ctx.pki_key {
        Some(key) => {
            if let Err(e) = verify_message(key, &destination.output, signature) {
                outcome.warn(e);
            }
        }
        None => outcome.warn(PaymailError::SignatureMismatch(
            "response is signed but no PKI key is available to verify it".into(),
        )),
    }
    outcome
}

/// Check a public profile. Missing fields are fine; a non-http avatar is not.
pub fn validate_profile(profile: &PublicProfile, _ctx: &ValidationContext) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::ok();
    if let Some(avatar) = profile.avatar.as_deref().filter(|a| !a.is_empty()) {
        let lower = avatar.to_ascii_lowercase();
        if !(lower.starts_with("https://") || lower.starts_with("http://")) {
            outcome.warn(PaymailError::invalid_data(
                "avatar",
                format!("{} is not an http(s) URL", avatar),
            ));
        }
    }
    outcome
}

/// Check a public key verification response.
pub fn validate_verification(
    verification: &VerifyPubKeyResponse,
    ctx: &ValidationContext,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::ok();
    if !verification.matches {
        outcome.warn(PaymailError::invalid_data(
            "match",
            format!("{} does not belong to {}", verification.pubkey, verification.handle),
        ));
    }
    check_handle_echo(&verification.handle, ctx, &mut outcome);
    if let Some(expected) = &ctx.expected_pubkey {
        if !verification.pubkey.eq_ignore_ascii_case(expected) {
            outcome.warn(PaymailError::invalid_data(
                "pubkey",
                format!("asked about {} but the answer is for {}", expected, verification.pubkey),
            ));
        }
    }
    outcome
}

/// Check a P2P payment destination response.
pub fn validate_p2p_destination(
    destination: &P2pDestinationResponse,
    _ctx: &ValidationContext,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::ok();
    if destination.outputs.is_empty() {
        outcome.error(PaymailError::invalid_data("outputs", "no outputs returned"));
    }
    if destination.reference.trim().is_empty() {
        outcome.error(PaymailError::invalid_data("reference", "reference is empty"));
    }
    for (i, output) in destination.outputs.iter().enumerate() {
        check_script(&format!("outputs[{}].script", i), &output.script, &mut outcome);
    }
    outcome
}

/// Compare an SRV record against the expected port, priority and weight.
pub fn validate_srv_record(record: &SrvRecord, options: &ResolveOptions) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::ok();
    if record.target.is_empty() || record.is_unavailable() {
        outcome.warn(PaymailError::invalid_data("srv.target", "target is empty"));
    }
    let checks = [
        ("srv.port", record.port, options.expected_port),
        ("srv.priority", record.priority, options.expected_priority),
        ("srv.weight", record.weight, options.expected_weight),
    ];
    for (field, actual, expected) in checks {
        if actual != expected {
            outcome.warn(PaymailError::invalid_data(
                field,
                format!("expected {}, found {}", expected, actual),
            ));
        }
    }
    outcome
}

/// Check the document version and report values that were dropped at parse time.
pub fn validate_document(document: &CapabilityDocument, options: &ResolveOptions) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::ok();
    if document.version != options.bsvalias_version {
        outcome.warn(PaymailError::invalid_data(
            "bsvalias",
            format!(
                "expected version {}, found {}",
                options.bsvalias_version, document.version
            ),
        ));
    }
    for key in &document.ignored {
        outcome.warn(PaymailError::invalid_data(
            key.clone(),
            "capability value is neither a URI template nor a flag",
        ));
    }
    outcome
}

fn check_script(field: &str, script: &str, outcome: &mut ValidationOutcome) {
    if let Err(e) = inspect_script(script) {
        outcome.error(PaymailError::invalid_data(field, e.to_string()));
    }
}

fn check_handle_echo(echoed: &str, ctx: &ValidationContext, outcome: &mut ValidationOutcome) {
    let Some(handle) = &ctx.handle else {
        return;
    };
    let matches = Handle::parse(echoed)
        .map(|h| h == *handle)
        .unwrap_or(false);
    if !matches {
        outcome.warn(PaymailError::invalid_data(
            "handle",
            format!("response is for {} instead of {}", echoed, handle),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::P2pOutput;
    use secp256k1::{Secp256k1, SecretKey};

    const P2PKH: &str = "76a914000000000000000000000000000000000000000088ac";

    fn keypair() -> (SecretKey, PublicKey) {
        let secret = SecretKey::from_slice(&[9u8; 32]).unwrap();
        (secret, PublicKey::from_secret_key(&Secp256k1::new(), &secret))
    }

    fn ctx() -> ValidationContext {
        ValidationContext::new(
            Some(Handle::parse("alice@example.com").unwrap()),
            &ResolveOptions::default(),
        )
    }

    #[test]
    fn test_pki_stage() {
        let (_, public) = keypair();
        let good = PkiResponse {
            bsvalias: Some("1.0".into()),
            handle: "alice@example.com".into(),
            pubkey: hex::encode(public.serialize()),
        };
        assert_eq!(validate_pki(&good, &ctx()), ValidationOutcome::ok());

        let bad = PkiResponse {
            handle: "mallory@example.com".into(),
            pubkey: "04abcd".into(),
            ..good
        };
        let outcome = validate_pki(&bad, &ctx());
        assert!(matches!(outcome.errors[0], PaymailError::InvalidKeyFormat(_)));
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_destination_signature_checks() {
        let (secret, public) = keypair();
        let signed = PaymentDestinationResponse {
            output: P2PKH.into(),
            signature: Some(sign_message(&secret, P2PKH).unwrap()),
        };

        let with_key = ctx().with_pki_key(Some(public));
        assert!(validate_destination(&signed, &with_key).warnings.is_empty());

        let other_secret = SecretKey::from_slice(&[3u8; 32]).unwrap();
        let other = PublicKey::from_secret_key(&Secp256k1::new(), &other_secret);
        let outcome = validate_destination(&signed, &ctx().with_pki_key(Some(other)));
        assert!(outcome.is_valid());
        assert!(matches!(outcome.warnings[0], PaymailError::SignatureMismatch(_)));

        let outcome = validate_destination(&signed, &ctx());
        assert!(matches!(outcome.warnings[0], PaymailError::SignatureMismatch(_)));

        let skipped = ValidationContext::new(None, &ResolveOptions::default().with_skip_pki(true))
            .with_pki_key(Some(other));
        assert_eq!(validate_destination(&signed, &skipped), ValidationOutcome::ok());
    }

    #[test]
    fn test_destination_bad_script() {
        let response = PaymentDestinationResponse {
            output: "76a914".into(),
            signature: None,
        };
        let outcome = validate_destination(&response, &ctx());
        assert!(matches!(
            &outcome.errors[0],
            PaymailError::InvalidData { field, .. } if field == "output"
        ));
    }

    #[test]
    fn test_profile_and_verification() {
        let profile = PublicProfile {
            name: None,
            avatar: Some("ftp://x/a.png".into()),
        };
        assert_eq!(validate_profile(&profile, &ctx()).warnings.len(), 1);
        assert!(validate_profile(&PublicProfile::default(), &ctx()).warnings.is_empty());

        let verification = VerifyPubKeyResponse {
            bsvalias: None,
            handle: "alice@example.com".into(),
            pubkey: "02aa".into(),
            matches: false,
        };
        let outcome =
            validate_verification(&verification, &ctx().with_expected_pubkey(Some("02bb".into())));
        assert!(outcome.is_valid());
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[test]
    fn test_p2p_stage() {
        let empty = P2pDestinationResponse {
            outputs: vec![],
            reference: " ".into(),
        };
        assert_eq!(validate_p2p_destination(&empty, &ctx()).errors.len(), 2);

        let good = P2pDestinationResponse {
            outputs: vec![P2pOutput {
                script: P2PKH.into(),
                satoshis: 1000,
            }],
            reference: "ref-1".into(),
        };
        assert!(validate_p2p_destination(&good, &ctx()).is_valid());
    }

    #[test]
    fn test_srv_stage() {
        let options = ResolveOptions::default();
        let record = SrvRecord::new("bsvalias.example.com", 443, 10, 10);
        assert_eq!(validate_srv_record(&record, &options), ValidationOutcome::ok());

        let record = SrvRecord::new("bsvalias.example.com", 8443, 0, 10);
        let outcome = validate_srv_record(&record, &options);
        assert!(outcome.is_valid());
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[test]
    fn test_document_stage() {
        let doc = CapabilityDocument::parse(
            r#"{"bsvalias":"2.0","capabilities":{"pki":"x","junk":[1]}}"#,
        )
        .unwrap();
        let outcome = validate_document(&doc, &ResolveOptions::default());
        assert!(outcome.is_valid());
        assert_eq!(outcome.warnings.len(), 2);
    }
}
