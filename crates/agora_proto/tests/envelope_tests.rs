use agora_crypto::AgentKeyPair;
use agora_proto::payload::TypedPayload;
use agora_proto::{
    EnvelopeBuilder, EnvelopeSigner, EnvelopeVerifier, MessageType, ProtoError, SignedEnvelope,
};
use serde_json::{json, Value};

fn signer() -> EnvelopeSigner {
    let kp = AgentKeyPair::generate();
    EnvelopeSigner::new(kp.secret_bytes()).unwrap()
}

fn echo_request(signer: &EnvelopeSigner) -> agora_proto::Envelope {
    EnvelopeBuilder::new()
        .id("req-1")
        .sender_id(signer.did())
        .recipient_id("did:key:z6MkRecipient")
        .thread("thread-1", None)
        .typed_payload(&TypedPayload::request("echo", Some(json!({"text": "hi"}))))
        .build()
        .unwrap()
}

#[tokio::test]
async fn signed_envelope_verifies() {
    let signer = signer();
    let signed = signer.sign(echo_request(&signer)).await.unwrap();
    assert_eq!(signed.envelope.kind, MessageType::Request);
    assert!(EnvelopeVerifier::new().verify(&signed));
}

#[tokio::test]
async fn verifies_after_wire_round_trip() {
    let signer = signer();
    let signed = signer.sign(echo_request(&signer)).await.unwrap();
    let wire = serde_json::to_string(&signed).unwrap();
    let back: Value = serde_json::from_str(&wire).unwrap();
    assert!(EnvelopeVerifier::new().verify_json(&back));
    let typed: SignedEnvelope = serde_json::from_str(&wire).unwrap();
    assert!(EnvelopeVerifier::new().verify(&typed));
}

#[tokio::test]
async fn tampered_intent_fails() {
    let signer = signer();
    let mut signed = signer.sign(echo_request(&signer)).await.unwrap();
    signed
        .envelope
        .payload
        .insert("intent".into(), json!("echo2"));
    assert!(!EnvelopeVerifier::new().verify(&signed));
}

#[tokio::test]
async fn tampered_sender_fails() {
    let signer = signer();
    let mut signed = signer.sign(echo_request(&signer)).await.unwrap();
    signed.envelope.sender.id = AgentKeyPair::generate().did();
    assert!(!EnvelopeVerifier::new().verify(&signed));
}

#[tokio::test]
async fn added_extension_field_fails() {
    let signer = signer();
    let signed = signer.sign(echo_request(&signer)).await.unwrap();
    let mut wire = serde_json::to_value(&signed).unwrap();
    wire["x-route"] = json!("fast");
    assert!(!EnvelopeVerifier::new().verify_json(&wire));
}

#[tokio::test]
async fn missing_sig_fails() {
    let signer = signer();
    let mut signed = signer.sign(echo_request(&signer)).await.unwrap();
    signed.sig.clear();
    assert!(!EnvelopeVerifier::new().verify(&signed));
}

#[test]
fn short_key_is_rejected() {
    match EnvelopeSigner::new(&[0u8; 16]) {
        Err(ProtoError::InvalidKey(msg)) => {
            assert_eq!(msg, "Ed25519 private key must be 32 bytes")
        }
        other => panic!("expected InvalidKey, got {other:?}"),
    }
}

#[tokio::test]
async fn encrypted_envelope_signs_ciphertext() {
    let signer = signer();
    let signed = signer
        .sign_encrypted(echo_request(&signer), "opaque-ciphertext")
        .await
        .unwrap();
    assert!(signed.is_encrypted());
    assert_eq!(signed.ciphertext(), Some("opaque-ciphertext"));
    assert!(signed.envelope.payload.get("intent").is_none());
    assert!(EnvelopeVerifier::new().verify(&signed));

    let mut flipped = signed.clone();
    flipped.encrypted = None;
    assert!(!EnvelopeVerifier::new().verify(&flipped));
}
