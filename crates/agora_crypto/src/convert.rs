//! Ed25519 → X25519 key conversion.
//!
//! Agents hold a single Ed25519 key pair. Key agreement runs over the
//! Montgomery form of the same curve:
//!   x25519_secret = clamp(SHA-512(ed25519_seed)[0..32])
//!   x25519_public = ed_compressed_point.to_montgomery()
//!
//! References:
//!   - RFC 7748 §4.1 (X25519)
//!   - RFC 8032 §5.1.5 (Ed25519 key expansion)

use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Convert an Ed25519 signing key (32-byte seed) to an X25519 static secret.
/// This uses the clamped SHA-512 expansion that ed25519-dalek uses internally.
pub fn ed25519_secret_to_x25519(ed_secret: &[u8; 32]) -> StaticSecret {
    use sha2::{Digest, Sha512};
    let mut h = Sha512::digest(ed_secret);
    // Clamp as per RFC 7748 §5
    h[0] &= 248;
    h[31] &= 127;
    h[31] |= 64;
    let mut key = [0u8; 32];
    key.copy_from_slice(&h[..32]);
    h.as_mut_slice().zeroize();
    StaticSecret::from(key)
}

/// Convert an Ed25519 verifying key (public, 32 bytes) to an X25519 public key.
/// Uses the birational map from the Ed25519 curve to Curve25519.
pub fn ed25519_pub_to_x25519(ed_pub: &[u8; 32]) -> Result<X25519Public, CryptoError> {
    use curve25519_dalek::edwards::CompressedEdwardsY;
    let compressed = CompressedEdwardsY::from_slice(ed_pub)
        .map_err(|_| CryptoError::InvalidKey("invalid Ed25519 public key".into()))?;
    let point = compressed.decompress().ok_or_else(|| {
        CryptoError::InvalidKey("Ed25519 public key decompression failed".into())
    })?;
    Ok(X25519Public::from(point.to_montgomery().to_bytes()))
}

/// X25519 ECDH between a local Ed25519 seed and a remote Ed25519 public key.
/// Symmetric: `ecdh(a_secret, b_pub) == ecdh(b_secret, a_pub)`.
pub fn ecdh(local_ed_secret: &[u8; 32], remote_ed_pub: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let local = ed25519_secret_to_x25519(local_ed_secret);
    let remote = ed25519_pub_to_x25519(remote_ed_pub)?;
    Ok(*local.diffie_hellman(&remote).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AgentKeyPair;

    #[test]
    fn converted_public_matches_converted_secret() {
        let kp = AgentKeyPair::generate();
        let from_secret = X25519Public::from(&kp.to_x25519_secret());
        let from_public = ed25519_pub_to_x25519(kp.public.as_bytes()).unwrap();
        assert_eq!(from_secret.as_bytes(), from_public.as_bytes());
    }

    #[test]
    fn ecdh_is_symmetric() {
        let a = AgentKeyPair::generate();
        let b = AgentKeyPair::generate();
        let ab = ecdh(a.secret_bytes(), b.public.as_bytes()).unwrap();
        let ba = ecdh(b.secret_bytes(), a.public.as_bytes()).unwrap();
        assert_eq!(ab, ba);
    }
}
