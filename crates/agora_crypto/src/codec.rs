//! base64url / UTF-8 helpers shared by every wire type.
//!
//! Encoding is always unpadded base64url. Decoding also accepts padded input
//! and the standard alphabet, since other relay clients emit both.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};

use crate::error::CryptoError;

pub fn b64_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn b64_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = s.trim_end_matches('=');
    match URL_SAFE_NO_PAD.decode(trimmed) {
        Ok(bytes) => Ok(bytes),
        Err(_) => Ok(STANDARD.decode(s)?),
    }
}

/// Decode into a fixed-size array, failing on any other length.
pub fn b64_decode_array<const N: usize>(s: &str) -> Result<[u8; N], CryptoError> {
    let bytes = b64_decode(s)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("expected {N} bytes, got {len}")))
}

pub fn utf8_encode(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

pub fn utf8_decode(bytes: Vec<u8>) -> Result<String, CryptoError> {
    Ok(String::from_utf8(bytes)?)
}
