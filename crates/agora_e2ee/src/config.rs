use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session manager limits and timers. Missing fields take the defaults, so a
/// partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_sessions: usize,
    pub session_timeout_ms: u64,
    /// Rotate sending keys of sessions older than `rotation_interval_ms`.
    pub forward_secrecy: bool,
    pub rotation_interval_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            session_timeout_ms: 30 * 60 * 1000,
            forward_secrecy: false,
            rotation_interval_ms: 60 * 60 * 1000,
            cleanup_interval_ms: 60 * 1000,
        }
    }
}

impl SessionConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_millis(self.rotation_interval_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}
