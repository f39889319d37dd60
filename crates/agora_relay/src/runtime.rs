//! AgentRuntime: one agent's identity, signer, session manager and relay
//! client, owned together instead of living in process-wide singletons.

use std::sync::Arc;

use agora_crypto::{codec, did, sealed_box, AgentKeyPair};
use agora_e2ee::maintenance::MaintenanceHandle;
use agora_e2ee::{E2eeSessionManager, EncryptedPayload, SessionConfig};
use agora_proto::api::ApiResponse;
use agora_proto::{
    Envelope, EnvelopeBuilder, EnvelopeSigner, EnvelopeVerifier, MessageType, SignedEnvelope,
    TypedPayload,
};
use parking_lot::Mutex;
use serde_json::Value;

use crate::client::RelayClient;
use crate::error::RuntimeError;
use crate::subscription::{MessageStream, SubscribeOptions};

/// A received envelope after signature check and, if needed, decryption.
#[derive(Debug, Clone)]
pub struct OpenedEnvelope {
    /// Envelope with the plaintext payload restored.
    pub envelope: Envelope,
    pub was_encrypted: bool,
    pub sig: String,
}

impl OpenedEnvelope {
    pub fn typed_payload(&self) -> TypedPayload {
        TypedPayload::parse(self.envelope.kind, &self.envelope.payload)
            .unwrap_or_else(|_| TypedPayload::Other(self.envelope.payload.clone()))
    }
}

pub struct AgentRuntime {
    key_pair: AgentKeyPair,
    signer: EnvelopeSigner,
    verifier: EnvelopeVerifier,
    sessions: Arc<E2eeSessionManager>,
    relay: RelayClient,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("did", &self.did())
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}

impl AgentRuntime {
    pub fn new(
        private_key: &[u8],
        session_config: SessionConfig,
        relay: RelayClient,
    ) -> Result<Self, RuntimeError> {
        let signer = EnvelopeSigner::new(private_key)?;
        let key_pair = signer.key_pair().clone();
        tracing::info!(target: "agora_relay", event = "runtime_started", did = %key_pair.did());
        Ok(Self {
            key_pair,
            signer,
            verifier: EnvelopeVerifier::new(),
            sessions: Arc::new(E2eeSessionManager::new(session_config)),
            relay,
            maintenance: Mutex::new(None),
        })
    }

    pub fn did(&self) -> String {
        self.key_pair.did()
    }

    pub fn sessions(&self) -> &Arc<E2eeSessionManager> {
        &self.sessions
    }

    pub fn relay(&self) -> &RelayClient {
        &self.relay
    }

    /// Start session cleanup/rotation timers. Idempotent; needs a tokio runtime.
    pub fn start_maintenance(&self) {
        let mut slot = self.maintenance.lock();
        if slot.is_none() {
            *slot = Some(self.sessions.spawn_maintenance());
        }
    }

    /// Builder pre-filled with a fresh id, this agent as sender and `payload`.
    pub fn envelope(&self, payload: &TypedPayload) -> EnvelopeBuilder {
        EnvelopeBuilder::new()
            .id(uuid::Uuid::new_v4().to_string())
            .sender_id(self.did())
            .typed_payload(payload)
    }

    /// Live session id with `remote_did`, creating it from the did:key if needed.
    pub fn open_session(&self, remote_did: &str) -> Result<String, RuntimeError> {
        if let Some(id) = self.sessions.session_for_peer(remote_did) {
            return Ok(id);
        }
        let remote_public = did::decode_did_key(remote_did)?;
        let session = self
            .sessions
            .create_session(remote_did, &remote_public, &self.key_pair)?;
        Ok(session.id.clone())
    }

    pub async fn send(&self, envelope: Envelope) -> Result<ApiResponse, RuntimeError> {
        let signed = self.signer.sign(envelope).await?;
        Ok(self.relay.submit_message(&signed).await)
    }

    /// Encrypt the payload for the envelope's recipient, sign the ciphertext
    /// form and submit it.
    pub async fn send_encrypted(&self, envelope: Envelope) -> Result<ApiResponse, RuntimeError> {
        let signed = self.seal_envelope(envelope).await?;
        Ok(self.relay.submit_message(&signed).await)
    }

    pub async fn seal_envelope(&self, envelope: Envelope) -> Result<SignedEnvelope, RuntimeError> {
        let recipient = envelope
            .recipient
            .as_ref()
            .map(|r| r.id.clone())
            .ok_or(RuntimeError::MissingRecipient)?;
        let session_id = self.open_session(&recipient)?;
        let plaintext = serde_json::to_string(&envelope.payload).map_err(agora_proto::ProtoError::from)?;
        let encrypted = self.sessions.encrypt_message(&session_id, &plaintext)?;
        let wire = encrypted.to_wire()?;
        Ok(self.signer.sign_encrypted(envelope, &wire).await?)
    }

    /// Verify an envelope as received and decrypt it when it is encrypted.
    pub fn open_envelope(&self, raw: &Value) -> Result<OpenedEnvelope, RuntimeError> {
        if !self.verifier.verify_json(raw) {
            return Err(RuntimeError::InvalidSignature);
        }
        let signed: SignedEnvelope =
            serde_json::from_value(raw.clone()).map_err(agora_proto::ProtoError::from)?;
        let was_encrypted = signed.is_encrypted();
        let SignedEnvelope { mut envelope, sig, .. } = signed;
        if was_encrypted {
            let ciphertext = envelope
                .payload
                .get(agora_proto::envelope::CIPHERTEXT_FIELD)
                .and_then(Value::as_str)
                .ok_or(RuntimeError::InvalidPlaintext)?;
            let encrypted = EncryptedPayload::from_wire(ciphertext)?;
            let session_id = self.open_session(&envelope.sender.id)?;
            let plaintext = self.sessions.decrypt_message(&session_id, &encrypted)?;
            envelope.payload = match serde_json::from_str::<Value>(&plaintext) {
                Ok(Value::Object(map)) => map,
                _ => return Err(RuntimeError::InvalidPlaintext),
            };
        }
        Ok(OpenedEnvelope {
            envelope,
            was_encrypted,
            sig,
        })
    }

    /// Subscribe to messages addressed to this agent.
    pub fn subscribe_inbox(&self, mut options: SubscribeOptions) -> MessageStream {
        if options.recipient.is_none() {
            options.recipient = Some(self.did());
        }
        self.relay.subscribe_messages(options)
    }

    /// Anonymous one-shot encryption to `remote_did`, base64url encoded.
    pub fn seal_for(&self, remote_did: &str, plaintext: &[u8]) -> Result<String, RuntimeError> {
        let recipient = did::decode_did_key(remote_did)?;
        let sealed = sealed_box::seal(&recipient, plaintext)?;
        Ok(codec::b64_encode(&sealed.to_bytes()))
    }

    pub fn open_sealed(&self, sealed: &str) -> Result<Vec<u8>, RuntimeError> {
        let bytes = codec::b64_decode(sealed)?;
        let sealed = sealed_box::SealedBox::from_bytes(&bytes)?;
        Ok(sealed_box::open(&sealed, &self.key_pair)?.to_vec())
    }

    /// Announce this agent with a signed HELLO.
    pub async fn hello(&self, name: Option<String>) -> Result<ApiResponse, RuntimeError> {
        let payload = TypedPayload::Hello(agora_proto::payload::HelloPayload {
            name,
            ..Default::default()
        });
        let envelope = self.envelope(&payload).kind(MessageType::Hello).build()?;
        self.send(envelope).await
    }

    /// Stop timers and drop all session state.
    pub fn dispose(&self) {
        self.maintenance.lock().take();
        self.sessions.dispose();
        tracing::info!(target: "agora_relay", event = "runtime_disposed", did = %self.did());
    }
}
