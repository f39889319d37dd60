use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RELAY_URL: &str = "http://localhost:8787";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub base_url: String,
    /// Server-side long-poll wait sent as `timeout` on subscription GETs.
    pub long_poll_timeout_secs: u64,
    /// Fixed pause after a failed poll before retrying.
    pub backoff_ms: u64,
    /// Client-side request timeout. Defaults to the long-poll wait plus 10 s.
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RELAY_URL.to_string(),
            long_poll_timeout_secs: 30,
            backoff_ms: 5000,
            request_timeout_secs: None,
            user_agent: concat!("agora-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RelayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `AGORA_RELAY_URL`, `AGORA_LONG_POLL_SECS` and
    /// `AGORA_BACKOFF_MS`. Unparseable numbers fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("AGORA_RELAY_URL").unwrap_or(defaults.base_url),
            long_poll_timeout_secs: env_number("AGORA_LONG_POLL_SECS")
                .unwrap_or(defaults.long_poll_timeout_secs),
            backoff_ms: env_number("AGORA_BACKOFF_MS").unwrap_or(defaults.backoff_ms),
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(self.long_poll_timeout_secs + 10),
        )
    }

    /// `base_url` without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn env_number(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RelayConfig::new("https://relay.example/");
        assert_eq!(cfg.base(), "https://relay.example");
        assert_eq!(cfg.backoff(), Duration::from_millis(5000));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(40));
        assert!(cfg.user_agent.starts_with("agora-relay/"));
    }
}
