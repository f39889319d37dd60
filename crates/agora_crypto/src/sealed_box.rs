//! Anonymous-sender sealed boxes.
//!
//! Lets an agent encrypt to any `did:key` without an established session.
//! Only the recipient can open the box; the sender stays anonymous.
//!
//! 1. Sender generates an ephemeral X25519 key pair.
//! 2. ECDH(ephemeral_secret, recipient_x25519_pk) → shared secret.
//! 3. HKDF(shared, salt = epk || recipient_x25519_pk) → 32-byte AEAD key.
//! 4. XChaCha20-Poly1305 with a random nonce, epk bound as AAD.
//!
//! Wire format: VERSION[1] | epk[32] | nonce[24] | ciphertext+tag

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};
use zeroize::{Zeroize, Zeroizing};

use crate::{aead, convert, error::CryptoError, identity::AgentKeyPair, kdf};

const VERSION: u8 = 0x01;
const EPK_LEN: usize = 32;
const MIN_LEN: usize = 1 + EPK_LEN + aead::NONCE_LEN + aead::TAG_LEN;
const INFO: &[u8] = b"agora-sealed-box-v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub ephemeral_public_key: [u8; 32],
    pub nonce: [u8; aead::NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + EPK_LEN + aead::NONCE_LEN + self.ciphertext.len());
        out.push(VERSION);
        out.extend_from_slice(&self.ephemeral_public_key);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_LEN {
            return Err(CryptoError::MalformedSealedBox("too short".into()));
        }
        if bytes[0] != VERSION {
            return Err(CryptoError::MalformedSealedBox(format!(
                "unsupported version {}",
                bytes[0]
            )));
        }
        let mut ephemeral_public_key = [0u8; EPK_LEN];
        ephemeral_public_key.copy_from_slice(&bytes[1..1 + EPK_LEN]);
        let mut nonce = [0u8; aead::NONCE_LEN];
        nonce.copy_from_slice(&bytes[1 + EPK_LEN..1 + EPK_LEN + aead::NONCE_LEN]);
        Ok(Self {
            ephemeral_public_key,
            nonce,
            ciphertext: bytes[1 + EPK_LEN + aead::NONCE_LEN..].to_vec(),
        })
    }
}

fn box_key(
    shared: &[u8; 32],
    epk: &[u8; 32],
    recipient_x: &X25519Public,
) -> Result<[u8; 32], CryptoError> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(epk);
    salt[32..].copy_from_slice(recipient_x.as_bytes());
    kdf::derive_key(shared, Some(&salt), INFO)
}

/// Seal `plaintext` so that only the holder of `recipient_ed_pub` can open it.
pub fn seal(recipient_ed_pub: &[u8; 32], plaintext: &[u8]) -> Result<SealedBox, CryptoError> {
    let recipient_x = convert::ed25519_pub_to_x25519(recipient_ed_pub)?;

    // Ephemeral X25519 key pair, never reused
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(&recipient_x);

    let mut key = box_key(shared.as_bytes(), ephemeral_public.as_bytes(), &recipient_x)?;
    let nonce = aead::random_nonce();
    let ciphertext = aead::encrypt(&key, &nonce, plaintext, ephemeral_public.as_bytes());
    key.zeroize();

    Ok(SealedBox {
        ephemeral_public_key: ephemeral_public.to_bytes(),
        nonce,
        ciphertext: ciphertext?,
    })
}

/// Open a sealed box with the recipient's key pair.
pub fn open(sealed: &SealedBox, recipient: &AgentKeyPair) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let recipient_secret = recipient.to_x25519_secret();
    let recipient_x = X25519Public::from(&recipient_secret);
    let epk = X25519Public::from(sealed.ephemeral_public_key);
    let shared = recipient_secret.diffie_hellman(&epk);

    let mut key = box_key(shared.as_bytes(), &sealed.ephemeral_public_key, &recipient_x)?;
    let plaintext = aead::decrypt(
        &key,
        &sealed.nonce,
        &sealed.ciphertext,
        &sealed.ephemeral_public_key,
    );
    key.zeroize();
    plaintext
}
