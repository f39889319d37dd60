//! agora_relay: relay client and agent runtime for Agora messaging
//!
//! # Modules
//! - `client`: RelayClient: one-shot RPCs folded into `{ok, error}`
//! - `subscription`: long-poll cursor state and channel-backed MessageStream
//! - `transport`: RelayTransport trait and the reqwest implementation
//! - `runtime`: AgentRuntime composing signer, sessions and relay
//! - `config`: RelayConfig

pub mod client;
pub mod config;
pub mod error;
pub mod runtime;
pub mod subscription;
pub mod transport;

pub use client::RelayClient;
pub use config::RelayConfig;
pub use error::{RelayError, RuntimeError};
pub use runtime::{AgentRuntime, OpenedEnvelope};
pub use subscription::{EventBatch, MessageStream, SubscribeOptions, Subscription};
pub use transport::{HttpTransport, RelayTransport};
