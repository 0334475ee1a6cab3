//! Capability invocation.
//!
//! Expands the advertised URI template of an operation, issues the request
//! and decodes the typed response. Validation of the decoded payload happens
//! separately in [`crate::validate`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capabilities::Operation;
use crate::handle::Handle;
use crate::http::HttpClient;
use crate::{PaymailError, Result};

mod operations;
mod template;

pub use operations::{
    get_p2p_destination, get_pki, get_public_profile, resolve_address, verify_pubkey,
    P2pDestinationRequest, P2pDestinationResponse, P2pOutput, PaymentDestinationRequest,
    PaymentDestinationResponse, PkiResponse, PublicProfile, SenderInfo, VerifyPubKeyResponse,
};
pub use template::{expand_template, TemplateParams};

/// A decoded capability response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Payload {
    /// Identity key.
    Pki(PkiResponse),
    /// Payment output script.
    PaymentDestination(PaymentDestinationResponse),
    /// Name and avatar.
    PublicProfile(PublicProfile),
    /// Key ownership answer.
    VerifyPubKey(VerifyPubKeyResponse),
    /// P2P payment outputs.
    P2pDestination(P2pDestinationResponse),
}

/// Per-call inputs of an invocation.
#[derive(Clone, Copy, Debug)]
pub struct InvokeParams<'a> {
    /// Handle being resolved.
    pub handle: &'a Handle,
    /// Sender details for address resolution.
    pub sender: &'a SenderInfo,
    /// Key to verify, for [`Operation::VerifyPubKey`].
    pub pubkey: Option<&'a str>,
    /// Amount for [`Operation::P2pPaymentDestination`].
    pub satoshis: Option<u64>,
}

/// Invoke `operation` through its endpoint `template`.
#[tracing::instrument(skip_all, fields(operation = %operation, handle = %params.handle))]
pub async fn invoke(
    http: &HttpClient,
    operation: Operation,
    template: &str,
    params: &InvokeParams<'_>,
) -> Result<Payload> {
    debug!(template, "invoking capability");
    let handle = params.handle;
    match operation {
        Operation::Pki => get_pki(http, template, handle).await.map(Payload::Pki),
        Operation::PaymentDestination => resolve_address(http, template, handle, params.sender)
            .await
            .map(Payload::PaymentDestination),
        Operation::PublicProfile => get_public_profile(http, template, handle)
            .await
            .map(Payload::PublicProfile),
        Operation::VerifyPubKey => {
            let pubkey = params.pubkey.ok_or_else(|| {
                PaymailError::invalid_data("pubkey", "no public key available to verify")
            })?;
            verify_pubkey(http, template, handle, pubkey)
                .await
                .map(Payload::VerifyPubKey)
        }
        Operation::P2pPaymentDestination => {
            let satoshis = params.satoshis.ok_or_else(|| {
                PaymailError::invalid_data("satoshis", "no amount given for a P2P destination")
            })?;
            get_p2p_destination(http, template, handle, satoshis)
                .await
                .map(Payload::P2pDestination)
        }
        Operation::SenderValidation => Err(PaymailError::CapabilityParse(format!(
            "{} is a flag capability, not an endpoint",
            operation
        ))),
    }
}
