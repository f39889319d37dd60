//! agora_crypto: cryptographic primitives for the Agora agent messaging protocol
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Keys travel as raw 32-byte buffers; custody is the caller's problem.
//!
//! # Module layout
//! - `identity`: Ed25519 agent key pairs + public key newtype
//! - `did`: `did:key:z…` encoding of Ed25519 public keys
//! - `convert`: Ed25519 → X25519 conversion for key agreement
//! - `aead`: XChaCha20-Poly1305 with caller-supplied nonces
//! - `sealed_box`: anonymous-sender public-key encryption
//! - `kdf`: HKDF-SHA256 key derivation
//! - `hash`: BLAKE3 identifiers (session ids)
//! - `codec`: base64url / UTF-8 helpers
//! - `error`: unified error type

pub mod aead;
pub mod codec;
pub mod convert;
pub mod did;
pub mod error;
pub mod hash;
pub mod identity;
pub mod kdf;
pub mod sealed_box;

pub use error::CryptoError;
pub use identity::{AgentKeyPair, PublicKeyBytes};
