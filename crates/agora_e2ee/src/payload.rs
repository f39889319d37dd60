//! Wire form of one encrypted message.

use agora_crypto::codec;
use serde::{Deserialize, Serialize};

use crate::error::E2eeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// base64url XChaCha20-Poly1305 ciphertext including the tag.
    pub ciphertext: String,
    /// base64url 24-byte nonce.
    pub nonce: String,
    /// Sender's rotation key, present once the sending session was rotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_public_key: Option<String>,
    /// Nonce counter value used for this message.
    pub sequence: u64,
    /// Unix milliseconds at encryption time.
    pub timestamp: i64,
}

impl EncryptedPayload {
    /// Opaque single-string form carried in an envelope's `payload.ciphertext`.
    pub fn to_wire(&self) -> Result<String, E2eeError> {
        let json =
            serde_json::to_vec(self).map_err(|e| E2eeError::MalformedPayload(e.to_string()))?;
        Ok(codec::b64_encode(&json))
    }

    pub fn from_wire(s: &str) -> Result<Self, E2eeError> {
        let json = codec::b64_decode(s).map_err(|e| E2eeError::MalformedPayload(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| E2eeError::MalformedPayload(e.to_string()))
    }
}
