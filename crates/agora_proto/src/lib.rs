//! agora_proto: envelopes, signing and wire types for Agora agent messaging
//!
//! Every on-wire type is JSON. Signatures cover a pinned canonical encoding
//! (sorted-key compact JSON, see [`canonical`]) so independent
//! implementations agree on the signed bytes.
//!
//! # Modules
//! - `envelope`: Envelope / SignedEnvelope data model
//! - `builder`: fail-closed fluent EnvelopeBuilder
//! - `signer`: EnvelopeSigner (Ed25519 over canonical bytes)
//! - `verifier`: EnvelopeVerifier (boolean predicate, key from `did:key`)
//! - `canonical`: canonical byte serialisation
//! - `payload`: typed payloads keyed by envelope type
//! - `api`: relay request/response bodies

pub mod api;
pub mod builder;
pub mod canonical;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod signer;
pub mod verifier;

pub use builder::EnvelopeBuilder;
pub use envelope::{Envelope, MessageType, Meta, Recipient, Sender, SignedEnvelope, Thread};
pub use error::ProtoError;
pub use payload::TypedPayload;
pub use signer::EnvelopeSigner;
pub use verifier::EnvelopeVerifier;
