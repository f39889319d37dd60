//! Fail-closed fluent builder for [`Envelope`].
//!
//! `build()` refuses to produce an envelope unless `id`, `type`, `sender` and
//! `payload` were all set. `ts` defaults to the build time. No I/O, no crypto.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::envelope::{Envelope, MessageType, Meta, Recipient, Sender, Thread, PROTOCOL_VERSION};
use crate::error::ProtoError;
use crate::payload::TypedPayload;

/// Current time in the envelope `ts` format (`2026-01-01T00:00:00.000Z`).
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    id: Option<String>,
    ts: Option<String>,
    kind: Option<MessageType>,
    sender: Option<Sender>,
    recipient: Option<Recipient>,
    thread: Option<Thread>,
    meta: Option<Meta>,
    payload: Option<Value>,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn ts(mut self, ts: impl Into<String>) -> Self {
        self.ts = Some(ts.into());
        self
    }

    pub fn kind(mut self, kind: MessageType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn sender(mut self, sender: Sender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Shorthand for a sender with only an id.
    pub fn sender_id(self, id: impl Into<String>) -> Self {
        self.sender(Sender::new(id))
    }

    pub fn recipient(mut self, recipient: Recipient) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn recipient_id(self, id: impl Into<String>) -> Self {
        self.recipient(Recipient::new(id))
    }

    pub fn thread(mut self, id: impl Into<String>, parent: Option<String>) -> Self {
        self.thread = Some(Thread {
            id: id.into(),
            parent,
        });
        self
    }

    pub fn meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Raw JSON payload. Must be an object; checked at `build()`.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn payload_map(self, payload: Map<String, Value>) -> Self {
        self.payload(Value::Object(payload))
    }

    /// Typed payload. Also sets `type` when the payload implies one and no
    /// type was set yet.
    pub fn typed_payload(mut self, payload: &TypedPayload) -> Self {
        if self.kind.is_none() {
            self.kind = payload.kind();
        }
        self.payload(Value::Object(payload.to_map()))
    }

    pub fn build(self) -> Result<Envelope, ProtoError> {
        let id = self.id.ok_or(ProtoError::MissingField("id"))?;
        let kind = self.kind.ok_or(ProtoError::MissingField("type"))?;
        let sender = self.sender.ok_or(ProtoError::MissingField("sender"))?;
        let payload = match self.payload.ok_or(ProtoError::MissingField("payload"))? {
            Value::Object(map) => map,
            _ => return Err(ProtoError::InvalidPayload),
        };
        Ok(Envelope {
            version: PROTOCOL_VERSION.to_string(),
            id,
            ts: self.ts.unwrap_or_else(now_ts),
            kind,
            sender,
            recipient: self.recipient,
            thread: self.thread,
            meta: self.meta,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete() -> EnvelopeBuilder {
        EnvelopeBuilder::new()
            .id("msg-1")
            .kind(MessageType::Request)
            .sender_id("did:key:zSender")
            .payload(json!({"intent": "echo"}))
    }

    #[test]
    fn builds_with_required_fields_and_defaults_ts() {
        let env = complete().build().unwrap();
        assert_eq!(env.version, "1.0");
        assert!(env.ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&env.ts).is_ok());
        assert!(env.recipient.is_none() && env.thread.is_none() && env.meta.is_none());
    }

    #[test]
    fn each_required_field_is_enforced() {
        let missing = |b: EnvelopeBuilder| match b.build() {
            Err(ProtoError::MissingField(f)) => f,
            other => panic!("expected MissingField, got {other:?}"),
        };
        let base = || EnvelopeBuilder::new();
        assert_eq!(
            missing(base().kind(MessageType::Hello).sender_id("d").payload(json!({}))),
            "id"
        );
        assert_eq!(missing(base().id("1").sender_id("d").payload(json!({}))), "type");
        assert_eq!(
            missing(base().id("1").kind(MessageType::Hello).payload(json!({}))),
            "sender"
        );
        assert_eq!(
            missing(base().id("1").kind(MessageType::Hello).sender_id("d")),
            "payload"
        );
    }

    #[test]
    fn rejects_non_object_payload() {
        let err = complete().payload(json!([1, 2])).build().unwrap_err();
        assert!(matches!(err, ProtoError::InvalidPayload));
    }

    #[test]
    fn explicit_ts_is_kept() {
        let env = complete().ts("2026-03-01T10:00:00.000Z").build().unwrap();
        assert_eq!(env.ts, "2026-03-01T10:00:00.000Z");
    }
}
