//! One end-to-end encrypted session between a local agent and a peer.
//!
//! # Key schedule
//!
//! ```text
//! shared = X25519(ed→x(local_secret), ed→x(remote_public))   symmetric in A/B
//! id     = BLAKE3("agora-e2ee-session-v1" ‖ sort(pub_a, pub_b))[..16]
//! base   = HKDF-SHA256(ikm = shared, salt = id, info = "agora-e2ee-base-v1")
//! ```
//!
//! Messages of an unrotated session are sealed under `base`. Both directions
//! share that key, so the nonce is 16 random bytes followed by the big-endian
//! sequence number: the counter keeps one sender's nonces distinct, the random
//! prefix keeps the two senders apart.
//!
//! # Rotation
//!
//! Rotating keeps `base`, the nonce counter and the replay window, and gives
//! the session a fresh sending X25519 key `e`. Messages then carry `E = e·G`
//! and are sealed under
//!
//! ```text
//! HKDF-SHA256(ikm = base ‖ X25519(e, remote_x), salt = E, info = "agora-e2ee-rotation-v1")
//! ```
//!
//! which the peer recomputes as `X25519(local_x, E)` without any handshake.
//! Once `e` is replaced it is zeroized, and messages sealed under it can no
//! longer be produced or opened from this side.

use agora_crypto::{aead, codec, convert, hash, kdf, AgentKeyPair, PublicKeyBytes};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroizing, ZeroizeOnDrop};

use crate::error::E2eeError;
use crate::payload::EncryptedPayload;

const BASE_INFO: &[u8] = b"agora-e2ee-base-v1";
const ROTATION_INFO: &[u8] = b"agora-e2ee-rotation-v1";
const AAD_LABEL: &[u8] = b"agora-e2ee-v1";
const NONCE_PREFIX_LEN: usize = 16;

#[derive(Clone, ZeroizeOnDrop)]
pub struct E2eeSession {
    #[zeroize(skip)]
    pub id: String,
    #[zeroize(skip)]
    pub remote_did: String,
    #[zeroize(skip)]
    pub remote_public_key: PublicKeyBytes,
    #[zeroize(skip)]
    local_key_pair: AgentKeyPair,
    shared_secret: [u8; 32],
    base_key: [u8; 32],
    /// Sending X25519 secret installed by rotation.
    send_ephemeral: Option<[u8; 32]>,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub last_activity_at: DateTime<Utc>,
    /// Next sequence number to send.
    #[zeroize(skip)]
    pub nonce_counter: u64,
    #[zeroize(skip)]
    pub last_received_sequence: Option<u64>,
    /// Number of rotations since the session was established.
    #[zeroize(skip)]
    pub generation: u32,
    /// Manager-assigned activity order, breaks timestamp ties on eviction.
    #[zeroize(skip)]
    pub(crate) activity_tick: u64,
}

impl std::fmt::Debug for E2eeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("E2eeSession")
            .field("id", &self.id)
            .field("remote_did", &self.remote_did)
            .field("generation", &self.generation)
            .field("nonce_counter", &self.nonce_counter)
            .field("last_activity_at", &self.last_activity_at)
            .finish_non_exhaustive()
    }
}

impl E2eeSession {
    pub fn establish(
        remote_did: impl Into<String>,
        remote_public_key: PublicKeyBytes,
        local_key_pair: &AgentKeyPair,
        now: DateTime<Utc>,
    ) -> Result<Self, E2eeError> {
        let shared_secret = convert::ecdh(local_key_pair.secret_bytes(), remote_public_key.as_bytes())?;
        let id = hash::session_id(local_key_pair.public.as_bytes(), remote_public_key.as_bytes());
        let base_key = kdf::derive_key(&shared_secret, Some(id.as_bytes()), BASE_INFO)?;
        Ok(Self {
            id,
            remote_did: remote_did.into(),
            remote_public_key,
            local_key_pair: local_key_pair.clone(),
            shared_secret,
            base_key,
            send_ephemeral: None,
            created_at: now,
            last_activity_at: now,
            nonce_counter: 0,
            last_received_sequence: None,
            generation: 0,
            activity_tick: 0,
        })
    }

    /// Raw X25519 output. Identical on both peers.
    pub fn shared_secret(&self) -> &[u8; 32] {
        &self.shared_secret
    }

    pub fn local_key_pair(&self) -> &AgentKeyPair {
        &self.local_key_pair
    }

    pub fn is_rotated(&self) -> bool {
        self.send_ephemeral.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout_ms: u64) -> bool {
        idle_ms(self.last_activity_at, now) > timeout_ms
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        idle_ms(self.created_at, now)
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>, tick: u64) {
        self.last_activity_at = now;
        self.activity_tick = tick;
    }

    fn send_ephemeral_public(&self) -> Option<[u8; 32]> {
        self.send_ephemeral
            .map(|secret| X25519Public::from(&StaticSecret::from(secret)).to_bytes())
    }

    fn message_key(&self, ephemeral: Option<&[u8; 32]>) -> Result<Zeroizing<[u8; 32]>, E2eeError> {
        let Some(epk) = ephemeral else {
            return Ok(Zeroizing::new(self.base_key));
        };
        let dh = match self.send_ephemeral {
            // Our own rotation key: pair it with the peer's static key.
            Some(secret) if self.send_ephemeral_public().as_ref() == Some(epk) => {
                let remote_x = convert::ed25519_pub_to_x25519(self.remote_public_key.as_bytes())?;
                StaticSecret::from(secret).diffie_hellman(&remote_x)
            }
            _ => self
                .local_key_pair
                .to_x25519_secret()
                .diffie_hellman(&X25519Public::from(*epk)),
        };
        let mut ikm = Zeroizing::new([0u8; 64]);
        ikm[..32].copy_from_slice(&self.base_key);
        ikm[32..].copy_from_slice(dh.as_bytes());
        Ok(Zeroizing::new(kdf::derive_key(&ikm[..], Some(&epk[..]), ROTATION_INFO)?))
    }

    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        now: DateTime<Utc>,
    ) -> Result<EncryptedPayload, E2eeError> {
        let sequence = self.nonce_counter;
        let mut nonce = [0u8; aead::NONCE_LEN];
        OsRng.fill_bytes(&mut nonce[..NONCE_PREFIX_LEN]);
        nonce[NONCE_PREFIX_LEN..].copy_from_slice(&sequence.to_be_bytes());

        let timestamp = now.timestamp_millis();
        let ephemeral = self.send_ephemeral_public();
        let key = self.message_key(ephemeral.as_ref())?;
        let aad = associated_data(sequence, timestamp, ephemeral.as_ref());
        let ciphertext = aead::encrypt(&key, &nonce, plaintext, &aad)?;

        self.nonce_counter += 1;
        Ok(EncryptedPayload {
            ciphertext: codec::b64_encode(&ciphertext),
            nonce: codec::b64_encode(&nonce),
            ephemeral_public_key: ephemeral.map(|k| codec::b64_encode(&k)),
            sequence,
            timestamp,
        })
    }

    /// Open `payload`. A `sequence` not strictly greater than the last one
    /// accepted is a replay; the window only moves on successful decryption.
    pub fn decrypt(&mut self, payload: &EncryptedPayload) -> Result<Zeroizing<Vec<u8>>, E2eeError> {
        if let Some(last) = self.last_received_sequence {
            if payload.sequence <= last {
                return Err(E2eeError::Replay {
                    last,
                    got: payload.sequence,
                });
            }
        }
        let nonce = codec::b64_decode_array::<{ aead::NONCE_LEN }>(&payload.nonce)
            .map_err(|e| E2eeError::MalformedPayload(format!("nonce: {e}")))?;
        let ciphertext = codec::b64_decode(&payload.ciphertext)
            .map_err(|e| E2eeError::MalformedPayload(format!("ciphertext: {e}")))?;
        let ephemeral = payload
            .ephemeral_public_key
            .as_deref()
            .map(codec::b64_decode_array::<32>)
            .transpose()
            .map_err(|e| E2eeError::MalformedPayload(format!("ephemeralPublicKey: {e}")))?;

        let key = self.message_key(ephemeral.as_ref())?;
        let aad = associated_data(payload.sequence, payload.timestamp, ephemeral.as_ref());
        let plaintext =
            aead::decrypt(&key, &nonce, &ciphertext, &aad).map_err(|_| E2eeError::Decryption)?;
        self.last_received_sequence = Some(payload.sequence);
        Ok(plaintext)
    }

    /// Successor session with a fresh sending key and a new id. Idle time
    /// carries over from `self`; rotation is not activity. `self` is left
    /// untouched and the caller drops it.
    pub fn rotated(&self, now: DateTime<Utc>) -> E2eeSession {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret).to_bytes();
        let mut next = self.clone();
        next.id = hash::rotated_session_id(&self.id, &public);
        next.send_ephemeral = Some(secret.to_bytes());
        next.created_at = now;
        next.generation = self.generation + 1;
        next
    }
}

fn idle_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - since).num_milliseconds()).unwrap_or(0)
}

fn associated_data(sequence: u64, timestamp: i64, ephemeral: Option<&[u8; 32]>) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_LABEL.len() + 16 + 32);
    aad.extend_from_slice(AAD_LABEL);
    aad.extend_from_slice(&sequence.to_be_bytes());
    aad.extend_from_slice(&timestamp.to_be_bytes());
    if let Some(epk) = ephemeral {
        aad.extend_from_slice(epk);
    }
    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (E2eeSession, E2eeSession) {
        let a = AgentKeyPair::generate();
        let b = AgentKeyPair::generate();
        let now = Utc::now();
        (
            E2eeSession::establish(b.did(), b.public, &a, now).unwrap(),
            E2eeSession::establish(a.did(), a.public, &b, now).unwrap(),
        )
    }

    #[test]
    fn nonce_embeds_sequence() {
        let (mut a, _) = pair();
        let p = a.encrypt(b"x", Utc::now()).unwrap();
        let nonce = codec::b64_decode(&p.nonce).unwrap();
        assert_eq!(&nonce[NONCE_PREFIX_LEN..], &0u64.to_be_bytes());
        assert_eq!(a.nonce_counter, 1);
    }

    #[test]
    fn sequence_is_authenticated() {
        let (mut a, mut b) = pair();
        let mut p = a.encrypt(b"x", Utc::now()).unwrap();
        p.sequence += 7;
        assert!(matches!(b.decrypt(&p), Err(E2eeError::Decryption)));
        assert_eq!(b.last_received_sequence, None);
    }

    #[test]
    fn rotated_sender_is_readable_by_unrotated_peer() {
        let (a, mut b) = pair();
        let mut a2 = a.rotated(Utc::now());
        assert_ne!(a2.id, a.id);
        assert_eq!(a2.generation, 1);
        assert_eq!(a2.last_activity_at, a.last_activity_at);
        let p = a2.encrypt(b"after rotation", Utc::now()).unwrap();
        assert!(p.ephemeral_public_key.is_some());
        assert_eq!(&*b.decrypt(&p).unwrap(), b"after rotation");
        // Loopback on the rotated side.
        assert_eq!(&*a2.decrypt(&p).unwrap(), b"after rotation");
    }

    #[test]
    fn replaced_rotation_key_cannot_open_old_messages() {
        let (a, _) = pair();
        let mut a1 = a.rotated(Utc::now());
        let p = a1.encrypt(b"gen1", Utc::now()).unwrap();
        let mut a2 = a1.rotated(Utc::now());
        assert!(matches!(a2.decrypt(&p), Err(E2eeError::Decryption)));
    }
}
