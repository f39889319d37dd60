//! Agent key management
//!
//! Every agent owns one long-term `AgentKeyPair` (Ed25519). The public half
//! doubles as the agent's address: it is embedded in a `did:key` identifier
//! (see [`crate::did`]) so a verifier never needs a key directory.
//!
//! The same key pair participates in E2EE key agreement after conversion to
//! X25519 (see [`crate::convert`]).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::{convert, did, error::CryptoError};

/// Error text for secret keys of the wrong size. Callers surface it verbatim.
pub const SECRET_KEY_LEN_MSG: &str = "Ed25519 private key must be 32 bytes";

// ── Public key newtype ───────────────────────────────────────────────────────

/// 32-byte Ed25519 public key, base64url-encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl PublicKeyBytes {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Public key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `did:key:z…` identifier for this key.
    pub fn to_did(&self) -> String {
        did::encode_did_key(&self.0)
    }

    /// Montgomery form of this key, for X25519.
    pub fn to_x25519(&self) -> Result<X25519Public, CryptoError> {
        convert::ed25519_pub_to_x25519(&self.0)
    }

    /// Short human-readable fingerprint: BLAKE3 of the key, first 8 bytes, hex.
    /// Only meant for log lines.
    pub fn fingerprint(&self) -> String {
        hex::encode(&blake3::hash(&self.0).as_bytes()[..8])
    }
}

// ── Agent key pair ───────────────────────────────────────────────────────────

/// Long-term agent signing key. Drop clears memory via ZeroizeOnDrop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AgentKeyPair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl std::fmt::Debug for AgentKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentKeyPair")
            .field("public", &self.public.to_b64())
            .finish_non_exhaustive()
    }
}

impl AgentKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            public: PublicKeyBytes(signing_key.verifying_key().to_bytes()),
            secret_bytes: signing_key.to_bytes(),
        }
    }

    /// Load from a raw 32-byte Ed25519 secret (seed). Any other length fails.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(SECRET_KEY_LEN_MSG.into()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let signing_key = SigningKey::from_bytes(&arr);
        Ok(Self {
            public: PublicKeyBytes(signing_key.verifying_key().to_bytes()),
            secret_bytes: arr,
        })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    pub fn did(&self) -> String {
        self.public.to_did()
    }

    /// Sign arbitrary bytes; returns the 64-byte raw Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        SigningKey::from_bytes(&self.secret_bytes).sign(msg).to_bytes()
    }

    /// Verify a signature made by any Ed25519 public key.
    pub fn verify(public: &[u8; 32], msg: &[u8], sig_bytes: &[u8]) -> Result<(), CryptoError> {
        let vk = VerifyingKey::from_bytes(public)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig_arr: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("Bad sig len".into()))?;
        vk.verify_strict(msg, &Signature::from_bytes(&sig_arr))
            .map_err(|_| CryptoError::SignatureVerification)
    }

    /// X25519 static secret derived from this signing key.
    pub fn to_x25519_secret(&self) -> StaticSecret {
        convert::ed25519_secret_to_x25519(&self.secret_bytes)
    }
}
