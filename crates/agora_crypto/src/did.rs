//! `did:key` identifiers for Ed25519 public keys.
//!
//! Format: `did:key:z` + base58btc( 0xed 0x01 || pubkey[32] )
//!
//! `z` is the multibase prefix for base58btc and `0xed 0x01` is the unsigned
//! varint multicodec for `ed25519-pub`.

use crate::error::CryptoError;

pub const DID_KEY_PREFIX: &str = "did:key:";
const MULTIBASE_BASE58BTC: char = 'z';
const ED25519_PUB_MULTICODEC: [u8; 2] = [0xed, 0x01];

pub fn encode_did_key(public_key: &[u8; 32]) -> String {
    let mut raw = Vec::with_capacity(2 + 32);
    raw.extend_from_slice(&ED25519_PUB_MULTICODEC);
    raw.extend_from_slice(public_key);
    format!(
        "{DID_KEY_PREFIX}{MULTIBASE_BASE58BTC}{}",
        bs58::encode(raw).into_string()
    )
}

/// Recover the Ed25519 public key embedded in a `did:key` identifier.
pub fn decode_did_key(did: &str) -> Result<[u8; 32], CryptoError> {
    let multibase = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| CryptoError::InvalidDid(format!("not a did:key identifier: {did}")))?;
    let encoded = multibase.strip_prefix(MULTIBASE_BASE58BTC).ok_or_else(|| {
        CryptoError::InvalidDid("only base58btc ('z') multibase is supported".into())
    })?;
    let raw = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| CryptoError::InvalidDid(format!("base58 decode failed: {e}")))?;
    if raw.len() != 34 || raw[..2] != ED25519_PUB_MULTICODEC {
        return Err(CryptoError::InvalidDid(
            "did:key does not carry an Ed25519 public key".into(),
        ));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&raw[2..]);
    Ok(key)
}

pub fn is_did_key(s: &str) -> bool {
    decode_did_key(s).is_ok()
}
