use agora_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum E2eeError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("decryption failed: ciphertext is not authentic for this session")]
    Decryption,

    #[error("replayed message: sequence {got} is not after {last}")]
    Replay { last: u64, got: u64 },

    #[error("malformed encrypted payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
