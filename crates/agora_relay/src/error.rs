use agora_crypto::CryptoError;
use agora_e2ee::E2eeError;
use agora_proto::ProtoError;
use thiserror::Error;

/// Transport-level failure. Never returned from `RelayClient` RPCs, which
/// fold it into `{ok: false, error}`.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid relay response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    E2ee(#[from] E2eeError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("envelope signature is invalid")]
    InvalidSignature,

    #[error("envelope has no recipient")]
    MissingRecipient,

    #[error("decrypted payload is not a JSON object")]
    InvalidPlaintext,
}
