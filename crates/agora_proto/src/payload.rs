//! Typed views over envelope payloads.
//!
//! The wire payload is always a JSON object; the envelope `type` decides how
//! it is read. Fields a peer adds beyond the known ones survive a
//! parse/`to_map` cycle through each struct's `extra` map, so re-serialising a
//! received payload does not drop signed content.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::envelope::MessageType;
use crate::error::ProtoError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Ask another agent to perform `intent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Shared body of the three escrow notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowPayload {
    pub escrow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload interpreted according to the envelope `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedPayload {
    Hello(HelloPayload),
    Welcome(HelloPayload),
    Status(StatusPayload),
    Request(RequestPayload),
    Offer(OfferPayload),
    Accept(AcceptPayload),
    Result(ResultPayload),
    Debate(DebatePayload),
    Error(ErrorPayload),
    Revoke(RevokePayload),
    EscrowHeld(EscrowPayload),
    EscrowReleased(EscrowPayload),
    EscrowRefunded(EscrowPayload),
    /// Payload kept as raw JSON (encrypted wrappers, extensions).
    Other(Map<String, Value>),
}

fn read<T: DeserializeOwned>(payload: &Map<String, Value>) -> Result<T, ProtoError> {
    serde_json::from_value(Value::Object(payload.clone())).map_err(|_| ProtoError::InvalidPayload)
}

fn write<T: Serialize>(payload: &T) -> Map<String, Value> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

impl TypedPayload {
    /// Read `payload` as the body of a `kind` envelope.
    pub fn parse(kind: MessageType, payload: &Map<String, Value>) -> Result<Self, ProtoError> {
        Ok(match kind {
            MessageType::Hello => TypedPayload::Hello(read(payload)?),
            MessageType::Welcome => TypedPayload::Welcome(read(payload)?),
            MessageType::Status => TypedPayload::Status(read(payload)?),
            MessageType::Request => TypedPayload::Request(read(payload)?),
            MessageType::Offer => TypedPayload::Offer(read(payload)?),
            MessageType::Accept => TypedPayload::Accept(read(payload)?),
            MessageType::Result => TypedPayload::Result(read(payload)?),
            MessageType::Debate => TypedPayload::Debate(read(payload)?),
            MessageType::Error => TypedPayload::Error(read(payload)?),
            MessageType::Revoke => TypedPayload::Revoke(read(payload)?),
            MessageType::EscrowHeld => TypedPayload::EscrowHeld(read(payload)?),
            MessageType::EscrowReleased => TypedPayload::EscrowReleased(read(payload)?),
            MessageType::EscrowRefunded => TypedPayload::EscrowRefunded(read(payload)?),
        })
    }

    /// Envelope type this payload belongs to; `None` for [`TypedPayload::Other`].
    pub fn kind(&self) -> Option<MessageType> {
        Some(match self {
            TypedPayload::Hello(_) => MessageType::Hello,
            TypedPayload::Welcome(_) => MessageType::Welcome,
            TypedPayload::Status(_) => MessageType::Status,
            TypedPayload::Request(_) => MessageType::Request,
            TypedPayload::Offer(_) => MessageType::Offer,
            TypedPayload::Accept(_) => MessageType::Accept,
            TypedPayload::Result(_) => MessageType::Result,
            TypedPayload::Debate(_) => MessageType::Debate,
            TypedPayload::Error(_) => MessageType::Error,
            TypedPayload::Revoke(_) => MessageType::Revoke,
            TypedPayload::EscrowHeld(_) => MessageType::EscrowHeld,
            TypedPayload::EscrowReleased(_) => MessageType::EscrowReleased,
            TypedPayload::EscrowRefunded(_) => MessageType::EscrowRefunded,
            TypedPayload::Other(_) => return None,
        })
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            TypedPayload::Hello(p) | TypedPayload::Welcome(p) => write(p),
            TypedPayload::Status(p) => write(p),
            TypedPayload::Request(p) => write(p),
            TypedPayload::Offer(p) => write(p),
            TypedPayload::Accept(p) => write(p),
            TypedPayload::Result(p) => write(p),
            TypedPayload::Debate(p) => write(p),
            TypedPayload::Error(p) => write(p),
            TypedPayload::Revoke(p) => write(p),
            TypedPayload::EscrowHeld(p)
            | TypedPayload::EscrowReleased(p)
            | TypedPayload::EscrowRefunded(p) => write(p),
            TypedPayload::Other(map) => map.clone(),
        }
    }

    pub fn request(intent: impl Into<String>, params: Option<Value>) -> Self {
        TypedPayload::Request(RequestPayload {
            intent: intent.into(),
            params,
            extra: Map::new(),
        })
    }

    pub fn error(code: Option<String>, message: impl Into<String>) -> Self {
        TypedPayload::Error(ErrorPayload {
            code,
            message: message.into(),
            extra: Map::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn request_keeps_unknown_fields() {
        let raw = obj(json!({"intent": "echo", "params": {"text": "hi"}, "deadline": 5}));
        let parsed = TypedPayload::parse(MessageType::Request, &raw).unwrap();
        match &parsed {
            TypedPayload::Request(r) => {
                assert_eq!(r.intent, "echo");
                assert_eq!(r.extra["deadline"], json!(5));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(parsed.to_map(), raw);
        assert_eq!(parsed.kind(), Some(MessageType::Request));
    }

    #[test]
    fn escrow_uses_camel_case() {
        let raw = obj(json!({"escrowId": "esc-1", "amount": 42}));
        let parsed = TypedPayload::parse(MessageType::EscrowReleased, &raw).unwrap();
        assert!(matches!(&parsed, TypedPayload::EscrowReleased(e) if e.escrow_id == "esc-1"));
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let err = TypedPayload::parse(MessageType::Request, &Map::new()).unwrap_err();
        assert!(matches!(err, ProtoError::InvalidPayload));
        assert!(TypedPayload::parse(MessageType::Error, &obj(json!({"code": "x"}))).is_err());
    }

    #[test]
    fn other_has_no_kind() {
        let p = TypedPayload::Other(obj(json!({"ciphertext": "abc"})));
        assert_eq!(p.kind(), None);
        assert_eq!(p.to_map()["ciphertext"], json!("abc"));
    }
}
