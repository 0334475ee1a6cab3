//! Output script inspection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::signature::double_sha256;

const OP_0: u8 = 0x00;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_HASH160: u8 = 0xa9;
const OP_CHECKSIG: u8 = 0xac;

const P2PKH_VERSION: u8 = 0x00;
const P2SH_VERSION: u8 = 0x05;

/// Reasons an output script is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The script is empty.
    #[error("script is empty")]
    Empty,

    /// The script is not valid hex.
    #[error("script is not hex: {0}")]
    NotHex(String),

    /// A push runs past the end of the script.
    #[error("push at byte {offset} needs {needed} bytes, {available} available")]
    TruncatedPush {
        /// Offset of the push opcode
        offset: usize,
        /// Bytes the push declares
        needed: usize,
        /// Bytes left in the script
        available: usize,
    },
}

/// Standard output templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// Pay to public key hash.
    P2pkh,
    /// Pay to script hash.
    P2sh,
    /// Pay to public key.
    P2pk,
    /// `OP_RETURN` data output.
    DataCarrier,
    /// Anything else.
    NonStandard,
}

/// What an output script looks like.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInfo {
    /// Template classification.
    pub kind: ScriptKind,
    /// Base58check address for P2PKH and P2SH outputs.
    pub address: Option<String>,
    /// Script length in bytes.
    pub len: usize,
}

/// Decode, parse and classify a hex output script.
pub fn inspect_script(script_hex: &str) -> Result<ScriptInfo, ScriptError> {
    let script_hex = script_hex.trim();
    if script_hex.is_empty() {
        return Err(ScriptError::Empty);
    }
    let script = hex::decode(script_hex).map_err(|e| ScriptError::NotHex(e.to_string()))?;
    check_pushes(&script)?;

    let kind = classify(&script);
    let address = match kind {
        ScriptKind::P2pkh => Some(base58check(P2PKH_VERSION, &script[3..23])),
        ScriptKind::P2sh => Some(base58check(P2SH_VERSION, &script[2..22])),
        _ => None,
    };

    Ok(ScriptInfo {
        kind,
        address,
        len: script.len(),
    })
}

/// Walk the script and make sure every push fits.
///
/// Everything after a top-level `OP_RETURN` is unparsed data.
fn check_pushes(script: &[u8]) -> Result<(), ScriptError> {
    let mut i = 0;
    while i < script.len() {
        let opcode = script[i];
        let (header, len) = match opcode {
            0x01..=0x4b => (1, opcode as usize),
            OP_PUSHDATA1 => (2, read_len(script, i, 1)?),
            OP_PUSHDATA2 => (3, read_len(script, i, 2)?),
            OP_PUSHDATA4 => (5, read_len(script, i, 4)?),
            OP_RETURN => return Ok(()),
            _ => (1, 0),
        };

        let available = script.len() - i - header;
        if len > available {
            return Err(ScriptError::TruncatedPush {
                offset: i,
                needed: len,
                available,
            });
        }
        i += header + len;
    }
    Ok(())
}

fn read_len(script: &[u8], offset: usize, width: usize) -> Result<usize, ScriptError> {
    let bytes = script
        .get(offset + 1..offset + 1 + width)
        .ok_or(ScriptError::TruncatedPush {
            offset,
            needed: width,
            available: script.len() - offset - 1,
        })?;
    Ok(bytes
        .iter()
        .rev()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize))
}

fn classify(script: &[u8]) -> ScriptKind {
    match script {
        [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            ScriptKind::P2pkh
        }
        [OP_HASH160, 0x14, hash @ .., OP_EQUAL] if hash.len() == 20 => ScriptKind::P2sh,
        [0x21, key @ .., OP_CHECKSIG] if key.len() == 33 => ScriptKind::P2pk,
        [0x41, key @ .., OP_CHECKSIG] if key.len() == 65 => ScriptKind::P2pk,
        [OP_RETURN, ..] | [OP_0, OP_RETURN, ..] => ScriptKind::DataCarrier,
        _ => ScriptKind::NonStandard,
    }
}

fn base58check(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 5);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = double_sha256(&data);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}
