use std::sync::Arc;

use agora_proto::api::{
    AgentRegistration, ApiResponse, DiscoverQuery, DiscoverResponse, PollResponse,
    SubmitMessageRequest,
};
use agora_proto::SignedEnvelope;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::subscription::{MessageStream, SubscribeOptions, Subscription};
use crate::transport::{HttpTransport, Query, RelayTransport};

pub const MESSAGES_PATH: &str = "/v1/messages";
pub const EVENTS_PATH: &str = "/events";
pub const AGENTS_PATH: &str = "/v1/agents";
pub const ESCROW_PATH: &str = "/v1/escrow";
pub const LEDGER_PATH: &str = "/v1/ledger";

/// Relay RPCs never return `Err`: transport, HTTP and decoding failures come
/// back as `{ok: false, error}` so a network blip cannot take down an agent.
#[derive(Clone)]
pub struct RelayClient {
    transport: Arc<dyn RelayTransport>,
    config: RelayConfig,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

fn fold<T: DeserializeOwned>(
    op: &'static str,
    result: Result<Value, RelayError>,
    failure: fn(String) -> T,
) -> T {
    let err = match result {
        Ok(body) => match serde_json::from_value(body) {
            Ok(parsed) => return parsed,
            Err(e) => RelayError::from(e),
        },
        Err(e) => e,
    };
    tracing::warn!(target: "agora_relay", event = "rpc_failed", op, error = %err);
    failure(err.to_string())
}

impl RelayClient {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: RelayConfig, transport: Arc<dyn RelayTransport>) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    async fn submit_to(&self, path: &'static str, envelope: &SignedEnvelope) -> ApiResponse {
        let body = match serde_json::to_value(SubmitMessageRequest {
            envelope: envelope.clone(),
        }) {
            Ok(body) => body,
            Err(e) => return ApiResponse::failure(e.to_string()),
        };
        let res = fold("submit", self.transport.post(path, &body).await, ApiResponse::failure);
        tracing::debug!(
            target: "agora_relay",
            event = "envelope_submitted",
            path,
            envelope_id = %envelope.envelope.id,
            ok = res.ok
        );
        res
    }

    /// `POST /v1/messages`.
    pub async fn submit_message(&self, envelope: &SignedEnvelope) -> ApiResponse {
        self.submit_to(MESSAGES_PATH, envelope).await
    }

    /// `POST /events` (legacy path).
    pub async fn submit_event(&self, envelope: &SignedEnvelope) -> ApiResponse {
        self.submit_to(EVENTS_PATH, envelope).await
    }

    async fn poll_once(&self, path: &'static str, options: &SubscribeOptions) -> PollResponse {
        let since = options.since.clone().unwrap_or_default();
        let query = options.query(&since, self.config.long_poll_timeout_secs);
        fold("poll", self.transport.get(path, &query).await, PollResponse::failure)
    }

    /// One-shot `GET /v1/messages`.
    pub async fn get_messages(&self, options: &SubscribeOptions) -> PollResponse {
        self.poll_once(MESSAGES_PATH, options).await
    }

    /// One-shot `GET /events` (legacy path).
    pub async fn get_events(&self, options: &SubscribeOptions) -> PollResponse {
        self.poll_once(EVENTS_PATH, options).await
    }

    pub async fn register_agent(&self, registration: &AgentRegistration) -> ApiResponse {
        let body = match serde_json::to_value(registration) {
            Ok(body) => body,
            Err(e) => return ApiResponse::failure(e.to_string()),
        };
        fold("register_agent", self.transport.post(AGENTS_PATH, &body).await, ApiResponse::failure)
    }

    pub async fn discover_agents(&self, query: &DiscoverQuery) -> DiscoverResponse {
        fold(
            "discover_agents",
            self.transport.get(AGENTS_PATH, &query.to_query()).await,
            DiscoverResponse::failure,
        )
    }

    /// Escrow record; the relay's fields land in `extra`.
    pub async fn get_escrow(&self, escrow_id: &str) -> ApiResponse {
        let query: Query = vec![("id", escrow_id.to_string())];
        fold("get_escrow", self.transport.get(ESCROW_PATH, &query).await, ApiResponse::failure)
    }

    /// Ledger entries for one agent; the relay's fields land in `extra`.
    pub async fn get_ledger(&self, agent_id: &str) -> ApiResponse {
        let query: Query = vec![("agent", agent_id.to_string())];
        fold("get_ledger", self.transport.get(LEDGER_PATH, &query).await, ApiResponse::failure)
    }

    /// Cursor state object for `GET /v1/messages`, driven by the caller.
    pub fn subscription(&self, options: SubscribeOptions) -> Subscription {
        Subscription::new(
            Arc::clone(&self.transport),
            MESSAGES_PATH,
            options,
            self.config.long_poll_timeout_secs,
            self.config.backoff(),
        )
    }

    /// Endless stream of message batches. Must be called inside a tokio
    /// runtime; drop the stream to cancel.
    pub fn subscribe_messages(&self, options: SubscribeOptions) -> MessageStream {
        tracing::info!(
            target: "agora_relay",
            event = "subscribe",
            path = MESSAGES_PATH,
            recipient = options.recipient.as_deref().unwrap_or("*")
        );
        self.subscription(options).spawn()
    }

    /// Same protocol over the legacy `GET /events` path.
    pub fn subscribe(&self, options: SubscribeOptions) -> MessageStream {
        Subscription::new(
            Arc::clone(&self.transport),
            EVENTS_PATH,
            options,
            self.config.long_poll_timeout_secs,
            self.config.backoff(),
        )
        .spawn()
    }
}
