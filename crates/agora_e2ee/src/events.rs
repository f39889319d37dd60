//! Session lifecycle notifications.
//!
//! Handlers run synchronously on the emitting thread, in registration order,
//! after the session lock has been released. A panicking handler is logged
//! and skipped; the remaining handlers still run.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    SessionCreated,
    SessionExpired,
    SessionRotated,
    MessageEncrypted,
    MessageDecrypted,
    Error,
    /// Wildcard: receives every event.
    Any,
}

impl SessionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventKind::SessionCreated => "session:created",
            SessionEventKind::SessionExpired => "session:expired",
            SessionEventKind::SessionRotated => "session:rotated",
            SessionEventKind::MessageEncrypted => "message:encrypted",
            SessionEventKind::MessageDecrypted => "message:decrypted",
            SessionEventKind::Error => "error",
            SessionEventKind::Any => "*",
        }
    }
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// Idle for longer than the session timeout.
    Timeout,
    /// Dropped to make room under `max_sessions`.
    Evicted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SessionCreated {
        session_id: String,
        remote_did: String,
    },
    SessionExpired {
        session_id: String,
        remote_did: String,
        reason: ExpiryReason,
    },
    SessionRotated {
        previous_id: String,
        session_id: String,
        remote_did: String,
    },
    MessageEncrypted {
        session_id: String,
        sequence: u64,
    },
    MessageDecrypted {
        session_id: String,
        sequence: u64,
    },
    Error {
        session_id: Option<String>,
        message: String,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::SessionCreated { .. } => SessionEventKind::SessionCreated,
            SessionEvent::SessionExpired { .. } => SessionEventKind::SessionExpired,
            SessionEvent::SessionRotated { .. } => SessionEventKind::SessionRotated,
            SessionEvent::MessageEncrypted { .. } => SessionEventKind::MessageEncrypted,
            SessionEvent::MessageDecrypted { .. } => SessionEventKind::MessageDecrypted,
            SessionEvent::Error { .. } => SessionEventKind::Error,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Returned by `on`; pass to `off` to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<(HandlerId, SessionEventKind, EventHandler)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn on<F>(&self, kind: SessionEventKind, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, kind, Arc::new(handler)));
        id
    }

    pub fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(h, _, _)| *h != id);
        handlers.len() != before
    }

    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        // Snapshot so handlers may register or remove handlers themselves.
        let matching: Vec<EventHandler> = self
            .handlers
            .read()
            .iter()
            .filter(|(_, k, _)| *k == kind || *k == SessionEventKind::Any)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        for handler in matching {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(
                    target: "agora_e2ee",
                    event = "handler_panicked",
                    kind = %kind,
                    "session event handler panicked; continuing with remaining handlers"
                );
            }
        }
    }
}
