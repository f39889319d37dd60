//! BLAKE3-based identifiers
//!
//! - Symmetric E2EE session ids (independent of which peer is "local")
//! - Session ids for rotated sessions

/// Session id for the pair `(a, b)` of Ed25519 public keys.
///
/// The keys are sorted before hashing, so both peers converge on the same id
/// no matter which side calls it.
pub fn session_id(a: &[u8; 32], b: &[u8; 32]) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"agora-e2ee-session-v1\x00");
    hasher.update(lo);
    hasher.update(hi);
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

/// Id of the session that replaces `previous_id` after a key rotation.
pub fn rotated_session_id(previous_id: &str, ephemeral_public: &[u8; 32]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"agora-e2ee-rotation-v1\x00");
    hasher.update(previous_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(ephemeral_public);
    hex::encode(&hasher.finalize().as_bytes()[..16])
}
