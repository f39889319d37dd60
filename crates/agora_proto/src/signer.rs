//! Envelope signing.
//!
//! The signature always covers exactly what is transmitted: for encrypted
//! envelopes that is the ciphertext wrapper plus `encrypted: true`, never the
//! pre-encryption plaintext.

use agora_crypto::{codec, AgentKeyPair};
use serde_json::{Map, Value};

use crate::canonical;
use crate::envelope::{Envelope, SignedEnvelope, CIPHERTEXT_FIELD};
use crate::error::ProtoError;

pub struct EnvelopeSigner {
    key_pair: AgentKeyPair,
}

impl std::fmt::Debug for EnvelopeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeSigner")
            .field("did", &self.did())
            .finish()
    }
}

impl EnvelopeSigner {
    /// Construct from a raw 32-byte Ed25519 private key.
    pub fn new(private_key: &[u8]) -> Result<Self, ProtoError> {
        let key_pair = AgentKeyPair::from_secret_bytes(private_key).map_err(|_| {
            ProtoError::InvalidKey(agora_crypto::identity::SECRET_KEY_LEN_MSG.to_string())
        })?;
        Ok(Self { key_pair })
    }

    pub fn from_key_pair(key_pair: AgentKeyPair) -> Self {
        Self { key_pair }
    }

    /// `did:key` of the signing key; envelopes should carry it as `sender.id`.
    pub fn did(&self) -> String {
        self.key_pair.did()
    }

    pub fn key_pair(&self) -> &AgentKeyPair {
        &self.key_pair
    }

    pub async fn sign(&self, envelope: Envelope) -> Result<SignedEnvelope, ProtoError> {
        self.sign_sync(envelope)
    }

    /// Replace the payload with `{"ciphertext": …}`, mark the envelope
    /// encrypted and sign the substituted structure.
    pub async fn sign_encrypted(
        &self,
        envelope: Envelope,
        ciphertext: &str,
    ) -> Result<SignedEnvelope, ProtoError> {
        self.sign_encrypted_sync(envelope, ciphertext)
    }

    pub fn sign_sync(&self, envelope: Envelope) -> Result<SignedEnvelope, ProtoError> {
        self.sign_with_flag(envelope, None)
    }

    pub fn sign_encrypted_sync(
        &self,
        mut envelope: Envelope,
        ciphertext: &str,
    ) -> Result<SignedEnvelope, ProtoError> {
        let mut wrapper = Map::new();
        wrapper.insert(CIPHERTEXT_FIELD.to_string(), Value::String(ciphertext.to_string()));
        envelope.payload = wrapper;
        self.sign_with_flag(envelope, Some(true))
    }

    fn sign_with_flag(
        &self,
        envelope: Envelope,
        encrypted: Option<bool>,
    ) -> Result<SignedEnvelope, ProtoError> {
        if envelope.sender.id != self.did() {
            tracing::warn!(
                target: "agora_proto",
                event = "sign_sender_mismatch",
                envelope_id = %envelope.id,
                sender_id = %envelope.sender.id,
                "sender.id is not this signer's did:key; receivers will reject the signature"
            );
        }
        let mut signed = SignedEnvelope {
            envelope,
            sig: String::new(),
            encrypted,
        };
        let bytes = canonical::signing_bytes_of(&signed)?;
        signed.sig = codec::b64_encode(&self.key_pair.sign(&bytes));
        tracing::debug!(
            target: "agora_proto",
            event = "envelope_signed",
            envelope_id = %signed.envelope.id,
            kind = %signed.envelope.kind,
            encrypted = signed.is_encrypted(),
            signed_bytes = bytes.len()
        );
        Ok(signed)
    }
}
