//! Bitcoin signed messages.
//!
//! Paymail services sign address resolution outputs, and senders sign their
//! requests, with the Bitcoin Signed Message scheme: a compact recoverable
//! ECDSA signature over the double SHA-256 of a magic-prefixed message,
//! transported as base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::{PaymailError, Result};

const MESSAGE_MAGIC: &str = "Bitcoin Signed Message:\n";

/// Length of a compressed public key in hex.
pub const PUBKEY_HEX_LEN: usize = 66;

/// SHA-256 applied twice.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Parse a compressed secp256k1 public key from hex.
pub fn parse_pubkey(hex_key: &str) -> Result<PublicKey> {
    if hex_key.len() != PUBKEY_HEX_LEN {
        return Err(PaymailError::InvalidKeyFormat(format!(
            "expected {} hex characters, got {}",
            PUBKEY_HEX_LEN,
            hex_key.len()
        )));
    }
    if !(hex_key.starts_with("02") || hex_key.starts_with("03")) {
        return Err(PaymailError::InvalidKeyFormat(
            "compressed key must start with 02 or 03".into(),
        ));
    }
    let bytes = hex::decode(hex_key)
        .map_err(|e| PaymailError::InvalidKeyFormat(format!("not hex: {}", e)))?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| PaymailError::InvalidKeyFormat(format!("not a curve point: {}", e)))
}

/// Digest a message the way Bitcoin signed messages do.
pub fn message_hash(message: &str) -> [u8; 32] {
    let mut data = Vec::with_capacity(MESSAGE_MAGIC.len() + message.len() + 10);
    write_varint(&mut data, MESSAGE_MAGIC.len() as u64);
    data.extend_from_slice(MESSAGE_MAGIC.as_bytes());
    write_varint(&mut data, message.len() as u64);
    data.extend_from_slice(message.as_bytes());
    double_sha256(&data)
}

/// Sign `message`, returning a base64 compact signature for a compressed key.
pub fn sign_message(secret: &SecretKey, message: &str) -> Result<String> {
    let secp = Secp256k1::signing_only();
    let digest = Message::from_slice(&message_hash(message))
        .map_err(|e| PaymailError::Internal(e.to_string()))?;
    let (recovery_id, compact) = secp
        .sign_ecdsa_recoverable(&digest, secret)
        .serialize_compact();

    let mut bytes = Vec::with_capacity(65);
    bytes.push(27 + 4 + recovery_id.to_i32() as u8);
    bytes.extend_from_slice(&compact);
    Ok(BASE64.encode(bytes))
}

/// Recover the public key that produced `signature` over `message`.
pub fn recover_pubkey(message: &str, signature: &str) -> Result<PublicKey> {
    let bytes = BASE64
        .decode(signature.trim())
        .map_err(|e| PaymailError::SignatureMismatch(format!("signature is not base64: {}", e)))?;
    if bytes.len() != 65 {
        return Err(PaymailError::SignatureMismatch(format!(
            "signature must be 65 bytes, got {}",
            bytes.len()
        )));
    }

    let header = bytes[0];
    if !(27..=34).contains(&header) {
        return Err(PaymailError::SignatureMismatch(format!(
            "invalid signature header {}",
            header
        )));
    }
    let recovery_id = RecoveryId::from_i32(i32::from((header - 27) & 3))
        .map_err(|e| PaymailError::SignatureMismatch(e.to_string()))?;
    let signature = RecoverableSignature::from_compact(&bytes[1..], recovery_id)
        .map_err(|e| PaymailError::SignatureMismatch(e.to_string()))?;

    let digest = Message::from_slice(&message_hash(message))
        .map_err(|e| PaymailError::Internal(e.to_string()))?;
    Secp256k1::verification_only()
        .recover_ecdsa(&digest, &signature)
        .map_err(|e| PaymailError::SignatureMismatch(format!("recovery failed: {}", e)))
}

/// Check that `signature` over `message` was made by `expected`.
pub fn verify_message(expected: &PublicKey, message: &str, signature: &str) -> Result<()> {
    let recovered = recover_pubkey(message, signature)?;
    if recovered != *expected {
        return Err(PaymailError::SignatureMismatch(format!(
            "signed by {} instead of {}",
            recovered, expected
        )));
    }
    Ok(())
}

fn write_varint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}
