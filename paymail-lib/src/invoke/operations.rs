//! Typed capability requests and responses.

use chrono::{DateTime, SecondsFormat, Utc};
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};

use super::template::{expand_template, TemplateParams};
use crate::handle::Handle;
use crate::http::HttpClient;
use crate::validate::signature::sign_message;
use crate::Result;

/// PKI response: the identity key of a handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkiResponse {
    /// Protocol version echoed by the service.
    #[serde(default)]
    pub bsvalias: Option<String>,
    /// Handle the key belongs to.
    pub handle: String,
    /// Compressed public key, hex.
    pub pubkey: String,
}

/// Who is asking for a payment destination.
#[derive(Clone, Debug, Default)]
pub struct SenderInfo {
    /// Display name of the sender.
    pub name: String,
    /// Paymail of the sender; the resolved handle when absent.
    pub handle: Option<Handle>,
    /// Amount in satoshis, if known.
    pub amount: Option<u64>,
    /// Human readable payment purpose.
    pub purpose: String,
    /// Pre-computed sender signature.
    pub signature: Option<String>,
    /// Key used to sign the request when no signature is given.
    pub signing_key: Option<SecretKey>,
}

impl SenderInfo {
    /// Create sender details with a display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the sender handle.
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Set the amount.
    pub fn with_amount(mut self, satoshis: u64) -> Self {
        self.amount = Some(satoshis);
        self
    }

    /// Set the purpose.
    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    /// Use a pre-computed signature.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Sign requests with `key`.
    pub fn with_signing_key(mut self, key: SecretKey) -> Self {
        self.signing_key = Some(key);
        self
    }
}

/// Body of an address resolution request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDestinationRequest {
    /// Display name of the sender.
    pub sender_name: String,
    /// Paymail of the sender.
    pub sender_handle: String,
    /// Request time, RFC 3339 UTC.
    pub dt: String,
    /// Amount in satoshis.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub amount: Option<u64>,
    /// Payment purpose.
    pub purpose: String,
    /// Sender signature over [`signing_message`](Self::signing_message).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
}

impl PaymentDestinationRequest {
    /// Build the request body for `target`, signing it if the sender has a key.
    pub fn new(target: &Handle, sender: &SenderInfo, now: DateTime<Utc>) -> Result<Self> {
        let mut request = Self {
            sender_name: sender.name.clone(),
            sender_handle: sender
                .handle
                .as_ref()
                .unwrap_or(target)
                .to_string(),
            dt: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            amount: sender.amount,
            purpose: sender.purpose.clone(),
            signature: sender.signature.clone(),
        };

        if request.signature.is_none() {
            if let Some(key) = &sender.signing_key {
                request.signature = Some(sign_message(key, &request.signing_message())?);
            }
        }

        Ok(request)
    }

    /// The message a sender signs: handle, amount, time and purpose concatenated.
    pub fn signing_message(&self) -> String {
        format!(
            "{}{}{}{}",
            self.sender_handle,
            self.amount.unwrap_or(0),
            self.dt,
            self.purpose
        )
    }
}

/// Address resolution response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDestinationResponse {
    /// Output script, hex.
    pub output: String,
    /// Signature of the service over `output`.
    #[serde(default)]
    pub signature: Option<String>,
}

/// Public profile of a handle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Public key verification response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPubKeyResponse {
    /// Protocol version echoed by the service.
    #[serde(default)]
    pub bsvalias: Option<String>,
    /// Handle that was checked.
    pub handle: String,
    /// Key that was checked.
    pub pubkey: String,
    /// Whether the key belongs to the handle.
    #[serde(rename = "match")]
    pub matches: bool,
}

/// P2P payment destination request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2pDestinationRequest {
    /// Amount to be paid.
    pub satoshis: u64,
}

/// One output of a P2P payment destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2pOutput {
    /// Output script, hex.
    pub script: String,
    /// Amount for this output.
    pub satoshis: u64,
}

/// P2P payment destination response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2pDestinationResponse {
    /// Outputs the payment must contain.
    pub outputs: Vec<P2pOutput>,
    /// Reference to send back with the transaction.
    pub reference: String,
}

fn handle_url(template: &str, handle: &Handle) -> Result<String> {
    expand_template(
        template,
        &TemplateParams::handle(handle.alias(), handle.domain().as_str()),
    )
}

/// Fetch the identity key of `handle`.
pub async fn get_pki(http: &HttpClient, template: &str, handle: &Handle) -> Result<PkiResponse> {
    let url = handle_url(template, handle)?;
    http.get_json(&url).await
}

/// Request a payment output script for `handle`.
pub async fn resolve_address(
    http: &HttpClient,
    template: &str,
    handle: &Handle,
    sender: &SenderInfo,
) -> Result<PaymentDestinationResponse> {
    let url = handle_url(template, handle)?;
    let body = PaymentDestinationRequest::new(handle, sender, Utc::now())?;
    http.post_json(&url, &body).await
}

/// Fetch name and avatar of `handle`.
pub async fn get_public_profile(
    http: &HttpClient,
    template: &str,
    handle: &Handle,
) -> Result<PublicProfile> {
    let url = handle_url(template, handle)?;
    http.get_json(&url).await
}

/// Ask whether `pubkey` belongs to `handle`.
pub async fn verify_pubkey(
    http: &HttpClient,
    template: &str,
    handle: &Handle,
    pubkey: &str,
) -> Result<VerifyPubKeyResponse> {
    let params =
        TemplateParams::handle(handle.alias(), handle.domain().as_str()).with_pubkey(pubkey);
    let url = expand_template(template, &params)?;
    http.get_json(&url).await
}

/// Request P2P payment outputs for `satoshis`.
pub async fn get_p2p_destination(
    http: &HttpClient,
    template: &str,
    handle: &Handle,
    satoshis: u64,
) -> Result<P2pDestinationResponse> {
    let url = handle_url(template, handle)?;
    http.post_json(&url, &P2pDestinationRequest { satoshis }).await
}
