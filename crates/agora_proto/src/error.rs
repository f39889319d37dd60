use agora_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Missing required envelope field: {0}")]
    MissingField(&'static str),

    #[error("{0}")]
    InvalidKey(String),

    #[error("Envelope payload must be a JSON object")]
    InvalidPayload,

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
