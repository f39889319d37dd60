//! Relay request/response bodies.
//! These map directly to JSON bodies on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::envelope::SignedEnvelope;

// ── Messages ─────────────────────────────────────────────────────────────────

/// `POST /v1/messages` and `POST /events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitMessageRequest {
    pub envelope: SignedEnvelope,
}

/// Generic relay reply. Transport and HTTP failures are folded into
/// `ok = false` with `error` set, so callers only ever see this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Endpoint-specific members (escrow state, ledger entries, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            error: Some(error.into()),
            extra: Map::new(),
        }
    }
}

/// `GET /v1/messages` and `GET /events`.
///
/// Events stay raw JSON so extension fields remain covered when the caller
/// verifies them with [`crate::EnvelopeVerifier::verify_json`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub ok: bool,
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(default, rename = "lastTs", skip_serializing_if = "Option::is_none")]
    pub last_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

// ── Agents ───────────────────────────────────────────────────────────────────

/// `POST /v1/agents`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    /// `did:key` of the agent.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Filters for `GET /v1/agents`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverQuery {
    pub capability: Option<String>,
    pub name: Option<String>,
    pub limit: Option<u32>,
}

impl DiscoverQuery {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut q = Vec::new();
        if let Some(c) = &self.capability {
            q.push(("capability", c.clone()));
        }
        if let Some(n) = &self.name {
            q.push(("name", n.clone()));
        }
        if let Some(l) = self.limit {
            q.push(("limit", l.to_string()));
        }
        q
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub ok: bool,
    #[serde(default)]
    pub agents: Vec<AgentRegistration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiscoverResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            agents: Vec::new(),
            error: Some(error.into()),
        }
    }
}
