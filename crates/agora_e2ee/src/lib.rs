//! agora_e2ee: end-to-end encrypted sessions between Agora agents
//!
//! Sessions are keyed by a symmetric id derived from both parties' Ed25519
//! public keys, so two agents that each call `create_session` with the
//! other's key land on the same id and the same X25519 shared secret.
//!
//! # Modules
//! - `session`: one session: key schedule, encrypt/decrypt, rotation
//! - `manager`: E2eeSessionManager: table, expiry, eviction, stats
//! - `events`: session lifecycle events and handler registry
//! - `maintenance`: tokio timers for cleanup and key rotation
//! - `payload`: EncryptedPayload wire form
//! - `config`: SessionConfig

pub mod config;
pub mod error;
pub mod events;
pub mod maintenance;
pub mod manager;
pub mod payload;
pub mod session;

pub use config::SessionConfig;
pub use error::E2eeError;
pub use events::{SessionEvent, SessionEventKind};
pub use manager::{E2eeSessionManager, SessionStats};
pub use payload::EncryptedPayload;
pub use session::E2eeSession;
