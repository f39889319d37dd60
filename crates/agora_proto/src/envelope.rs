//! Envelope: the canonical message wrapper exchanged between agents.
//!
//! The relay sees the whole envelope. Confidentiality, when needed, comes
//! from replacing `payload` with E2EE ciphertext (`encrypted = true`); the
//! routing fields (`sender`, `recipient`, `thread`, `type`) stay readable so
//! the relay can filter on them.
//!
//! Unset optional fields are omitted from JSON, never serialised as `null`:
//! the canonical bytes must not depend on how a peer spells "absent".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtoError;

/// Protocol version carried by every envelope.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Closed set of envelope types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Hello,
    Welcome,
    Status,
    Request,
    Offer,
    Accept,
    Result,
    Debate,
    Error,
    Revoke,
    EscrowHeld,
    EscrowReleased,
    EscrowRefunded,
}

impl MessageType {
    pub const ALL: [MessageType; 13] = [
        MessageType::Hello,
        MessageType::Welcome,
        MessageType::Status,
        MessageType::Request,
        MessageType::Offer,
        MessageType::Accept,
        MessageType::Result,
        MessageType::Debate,
        MessageType::Error,
        MessageType::Revoke,
        MessageType::EscrowHeld,
        MessageType::EscrowReleased,
        MessageType::EscrowRefunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Hello => "HELLO",
            MessageType::Welcome => "WELCOME",
            MessageType::Status => "STATUS",
            MessageType::Request => "REQUEST",
            MessageType::Offer => "OFFER",
            MessageType::Accept => "ACCEPT",
            MessageType::Result => "RESULT",
            MessageType::Debate => "DEBATE",
            MessageType::Error => "ERROR",
            MessageType::Revoke => "REVOKE",
            MessageType::EscrowHeld => "ESCROW_HELD",
            MessageType::EscrowReleased => "ESCROW_RELEASED",
            MessageType::EscrowRefunded => "ESCROW_REFUNDED",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact wire names only, matching serde.
impl FromStr for MessageType {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtoError::UnknownMessageType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// `did:key:z…` of the signing agent.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Sender {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Recipient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
        }
    }
}

/// Groups related envelopes into a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Routing / lifetime hints. Opaque to the protocol core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hop: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Unsigned envelope. Construct through [`crate::EnvelopeBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub id: String,
    /// RFC 3339 UTC timestamp, millisecond precision. Kept as the exact string
    /// that was signed; reformatting it would break the signature.
    pub ts: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Recipient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    pub payload: Map<String, Value>,
}

/// Envelope plus signature over its canonical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// base64url (unpadded) Ed25519 signature. Empty when missing on the wire.
    #[serde(default)]
    pub sig: String,
    /// `true` when `payload` holds `{"ciphertext": …}` instead of plaintext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
}

impl SignedEnvelope {
    pub fn is_encrypted(&self) -> bool {
        self.encrypted.unwrap_or(false)
    }

    /// Ciphertext string carried by an encrypted envelope.
    pub fn ciphertext(&self) -> Option<&str> {
        if !self.is_encrypted() {
            return None;
        }
        self.envelope.payload.get(CIPHERTEXT_FIELD).and_then(Value::as_str)
    }

    pub fn sender_id(&self) -> &str {
        &self.envelope.sender.id
    }
}

/// Payload key under which encrypted envelopes carry their ciphertext.
pub const CIPHERTEXT_FIELD: &str = "ciphertext";
