//! Envelope verification.
//!
//! `verify` is a predicate: it returns `false` for every failure (missing
//! `sig`, undecodable signature, sender id that is not a `did:key`, any
//! post-signing mutation) and never returns an error or panics.

use agora_crypto::{codec, did, AgentKeyPair};
use serde_json::Value;

use crate::canonical;
use crate::envelope::SignedEnvelope;

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeVerifier;

impl EnvelopeVerifier {
    pub fn new() -> Self {
        Self
    }

    pub fn verify(&self, signed: &SignedEnvelope) -> bool {
        match serde_json::to_value(signed) {
            Ok(value) => self.verify_json(&value),
            Err(_) => false,
        }
    }

    /// Verify an envelope exactly as received. Extension fields unknown to
    /// [`SignedEnvelope`] are part of the signed bytes.
    pub fn verify_json(&self, envelope: &Value) -> bool {
        let outcome = check(envelope);
        if let Err(reason) = outcome {
            let envelope_id = envelope.get("id").and_then(|v| v.as_str()).unwrap_or("");
            tracing::debug!(
                target: "agora_proto",
                event = "envelope_rejected",
                envelope_id,
                reason
            );
        }
        outcome.is_ok()
    }
}

fn check(envelope: &Value) -> Result<(), &'static str> {
    let sig = envelope
        .get(canonical::SIG_FIELD)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or("missing sig")?;
    let sender_id = envelope
        .get("sender")
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str)
        .ok_or("missing sender.id")?;
    let public_key = did::decode_did_key(sender_id).map_err(|_| "sender.id is not a did:key")?;
    let sig_bytes = codec::b64_decode(sig).map_err(|_| "sig is not base64")?;
    let bytes = canonical::signing_bytes(envelope);
    AgentKeyPair::verify(&public_key, &bytes, &sig_bytes).map_err(|_| "bad signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn garbage_is_false_not_panic() {
        let v = EnvelopeVerifier::new();
        assert!(!v.verify_json(&json!(null)));
        assert!(!v.verify_json(&json!({"sig": 5})));
        assert!(!v.verify_json(&json!({"sig": "abc", "sender": {"id": "agent-1"}})));
        assert!(!v.verify_json(&json!({
            "sig": "!!!",
            "sender": {"id": agora_crypto::did::encode_did_key(&[9u8; 32])}
        })));
    }
}
