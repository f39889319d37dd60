//! E2eeSessionManager: the session table plus its lifecycle rules.
//!
//! All mutation goes through one `parking_lot::Mutex` over the table, so
//! encrypt/decrypt, eviction, cleanup and rotation are serialised. Events are
//! collected while the lock is held and emitted after it is released.

use std::collections::HashMap;
use std::sync::Arc;

use agora_crypto::{codec, AgentKeyPair, PublicKeyBytes};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::SessionConfig;
use crate::error::E2eeError;
use crate::events::{EventBus, ExpiryReason, HandlerId, SessionEvent, SessionEventKind};
use crate::maintenance::{self, MaintenanceHandle};
use crate::payload::EncryptedPayload;
use crate::session::E2eeSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_sessions: usize,
    /// Sessions not yet past the idle timeout.
    pub active_sessions: usize,
    /// `created_at` of the oldest session.
    pub oldest_session: Option<DateTime<Utc>>,
    pub newest_session: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SessionTable {
    sessions: HashMap<String, E2eeSession>,
    tick: u64,
}

impl SessionTable {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn least_recently_active(&self) -> Option<String> {
        self.sessions
            .values()
            .min_by_key(|s| (s.last_activity_at, s.activity_tick))
            .map(|s| s.id.clone())
    }
}

#[derive(Debug)]
pub struct E2eeSessionManager {
    config: SessionConfig,
    table: Mutex<SessionTable>,
    events: EventBus,
}

impl Default for E2eeSessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl E2eeSessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            table: Mutex::new(SessionTable::default()),
            events: EventBus::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in &events {
            self.events.emit(event);
        }
    }

    fn fail(&self, session_id: Option<&str>, err: E2eeError) -> E2eeError {
        self.events.emit(&SessionEvent::Error {
            session_id: session_id.map(str::to_owned),
            message: err.to_string(),
        });
        err
    }

    /// Establish (or return the live) session with `remote_did`. Both peers
    /// calling this with each other's public key get the same id and secret.
    pub fn create_session(
        &self,
        remote_did: &str,
        remote_public_key: &[u8],
        local_key_pair: &AgentKeyPair,
    ) -> Result<E2eeSession, E2eeError> {
        let remote = PublicKeyBytes::from_slice(remote_public_key)
            .map_err(|e| self.fail(None, e.into()))?;
        let now = Utc::now();
        let mut session = E2eeSession::establish(remote_did, remote, local_key_pair, now)
            .map_err(|e| self.fail(None, e))?;

        let mut pending = Vec::new();
        let created = {
            let mut table = self.table.lock();
            let live = table
                .sessions
                .get(&session.id)
                .filter(|s| !s.is_expired(now, self.config.session_timeout_ms))
                .cloned();
            if let Some(existing) = live {
                existing
            } else {
                if let Some(stale) = table.sessions.remove(&session.id) {
                    pending.push(expired_event(&stale, ExpiryReason::Timeout));
                }
                while table.sessions.len() >= self.config.max_sessions.max(1) {
                    match evict_oldest(&mut table) {
                        Some(evicted) => pending.push(evicted),
                        None => break,
                    }
                }
                let tick = table.next_tick();
                session.touch(now, tick);
                table.sessions.insert(session.id.clone(), session.clone());
                pending.push(SessionEvent::SessionCreated {
                    session_id: session.id.clone(),
                    remote_did: session.remote_did.clone(),
                });
                tracing::info!(
                    target: "agora_e2ee",
                    event = "session_created",
                    session_id = %session.id,
                    remote_did = %session.remote_did,
                    total = table.sessions.len()
                );
                session
            }
        };
        self.emit_all(pending);
        Ok(created)
    }

    /// Snapshot of a session, expired or not.
    pub fn get_session(&self, session_id: &str) -> Option<E2eeSession> {
        self.table.lock().sessions.get(session_id).cloned()
    }

    /// `true` only for a known, unexpired session.
    pub fn has_session(&self, session_id: &str) -> bool {
        let now = Utc::now();
        self.table
            .lock()
            .sessions
            .get(session_id)
            .map(|s| !s.is_expired(now, self.config.session_timeout_ms))
            .unwrap_or(false)
    }

    /// Id of the live session with `remote_did`, following rotations.
    pub fn session_for_peer(&self, remote_did: &str) -> Option<String> {
        let now = Utc::now();
        self.table
            .lock()
            .sessions
            .values()
            .filter(|s| s.remote_did == remote_did)
            .filter(|s| !s.is_expired(now, self.config.session_timeout_ms))
            .max_by_key(|s| (s.generation, s.activity_tick))
            .map(|s| s.id.clone())
    }

    fn with_live_session<T>(
        &self,
        session_id: &str,
        op: impl FnOnce(&mut E2eeSession, DateTime<Utc>) -> Result<T, E2eeError>,
    ) -> Result<T, E2eeError> {
        let now = Utc::now();
        let result = {
            let mut table = self.table.lock();
            let tick = table.next_tick();
            match table.sessions.get_mut(session_id) {
                None => Err(E2eeError::SessionNotFound(session_id.to_string())),
                Some(s) if s.is_expired(now, self.config.session_timeout_ms) => {
                    Err(E2eeError::SessionExpired(session_id.to_string()))
                }
                Some(s) => op(&mut *s, now).map(|out| {
                    s.touch(now, tick);
                    out
                }),
            }
        };
        result.map_err(|e| self.fail(Some(session_id), e))
    }

    pub fn encrypt_message(
        &self,
        session_id: &str,
        plaintext: &str,
    ) -> Result<EncryptedPayload, E2eeError> {
        let payload = self.with_live_session(session_id, |s, now| {
            s.encrypt(&codec::utf8_encode(plaintext), now)
        })?;
        tracing::debug!(
            target: "agora_e2ee",
            event = "message_encrypted",
            session_id,
            sequence = payload.sequence,
            bytes = plaintext.len()
        );
        self.events.emit(&SessionEvent::MessageEncrypted {
            session_id: session_id.to_string(),
            sequence: payload.sequence,
        });
        Ok(payload)
    }

    pub fn decrypt_message(
        &self,
        session_id: &str,
        payload: &EncryptedPayload,
    ) -> Result<String, E2eeError> {
        let plaintext = self.with_live_session(session_id, |s, _| {
            let bytes = s.decrypt(payload)?;
            Ok(codec::utf8_decode(bytes.to_vec())?)
        });
        let plaintext = match plaintext {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(
                    target: "agora_e2ee",
                    event = "decrypt_rejected",
                    session_id,
                    sequence = payload.sequence,
                    error = %err
                );
                return Err(err);
            }
        };
        tracing::debug!(
            target: "agora_e2ee",
            event = "message_decrypted",
            session_id,
            sequence = payload.sequence
        );
        self.events.emit(&SessionEvent::MessageDecrypted {
            session_id: session_id.to_string(),
            sequence: payload.sequence,
        });
        Ok(plaintext)
    }

    /// Drop the least-recently-active session. Returns its id.
    pub fn evict_oldest_session(&self) -> Option<String> {
        let event = evict_oldest(&mut self.table.lock())?;
        let id = match &event {
            SessionEvent::SessionExpired { session_id, .. } => session_id.clone(),
            _ => String::new(),
        };
        self.events.emit(&event);
        Some(id)
    }

    pub fn cleanup_expired_sessions(&self) -> usize {
        self.cleanup_expired_sessions_at(Utc::now())
    }

    /// Remove every session idle for longer than the timeout as of `now`.
    pub fn cleanup_expired_sessions_at(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<E2eeSession> = {
            let mut table = self.table.lock();
            let ids: Vec<String> = table
                .sessions
                .values()
                .filter(|s| s.is_expired(now, self.config.session_timeout_ms))
                .map(|s| s.id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| table.sessions.remove(id))
                .collect()
        };
        if !expired.is_empty() {
            tracing::info!(
                target: "agora_e2ee",
                event = "sessions_expired",
                count = expired.len()
            );
        }
        let events = expired
            .iter()
            .map(|s| expired_event(s, ExpiryReason::Timeout))
            .collect();
        self.emit_all(events);
        expired.len()
    }

    pub fn rotate_expired_keys(&self) -> usize {
        self.rotate_expired_keys_at(Utc::now())
    }

    /// Rotate every live session older than the rotation interval. Expired
    /// sessions are left for cleanup. No-op unless forward secrecy is enabled.
    pub fn rotate_expired_keys_at(&self, now: DateTime<Utc>) -> usize {
        if !self.config.forward_secrecy {
            return 0;
        }
        let timeout_ms = self.config.session_timeout_ms;
        let events: Vec<SessionEvent> = {
            let mut table = self.table.lock();
            let due: Vec<String> = table
                .sessions
                .values()
                .filter(|s| !s.is_expired(now, timeout_ms))
                .filter(|s| s.age_ms(now) > self.config.rotation_interval_ms)
                .map(|s| s.id.clone())
                .collect();
            due.iter()
                .filter_map(|id| rotate_in_table(&mut table, id, now))
                .collect()
        };
        let rotated = events.len();
        self.emit_all(events);
        rotated
    }

    /// Rotate one session now. Returns the successor's id; the old id stops
    /// resolving.
    pub fn rotate_session(&self, session_id: &str) -> Result<String, E2eeError> {
        let now = Utc::now();
        let rotated = {
            let mut table = self.table.lock();
            let expired = table
                .sessions
                .get(session_id)
                .map(|s| s.is_expired(now, self.config.session_timeout_ms));
            match expired {
                None => Err(E2eeError::SessionNotFound(session_id.to_string())),
                Some(true) => Err(E2eeError::SessionExpired(session_id.to_string())),
                Some(false) => rotate_in_table(&mut table, session_id, now)
                    .ok_or_else(|| E2eeError::SessionNotFound(session_id.to_string())),
            }
        };
        let event = rotated.map_err(|e| self.fail(Some(session_id), e))?;
        let next_id = match &event {
            SessionEvent::SessionRotated { session_id, .. } => session_id.clone(),
            _ => String::new(),
        };
        self.events.emit(&event);
        Ok(next_id)
    }

    pub fn remove_session(&self, session_id: &str) -> bool {
        self.table.lock().sessions.remove(session_id).is_some()
    }

    pub fn get_stats(&self) -> SessionStats {
        let now = Utc::now();
        let table = self.table.lock();
        let sessions = table.sessions.values();
        SessionStats {
            total_sessions: table.sessions.len(),
            active_sessions: sessions
                .clone()
                .filter(|s| !s.is_expired(now, self.config.session_timeout_ms))
                .count(),
            oldest_session: sessions.clone().map(|s| s.created_at).min(),
            newest_session: sessions.map(|s| s.created_at).max(),
        }
    }

    pub fn on<F>(&self, kind: SessionEventKind, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.events.off(id)
    }

    /// Start the cleanup (and, with forward secrecy, rotation) timers.
    /// Must be called inside a tokio runtime.
    pub fn spawn_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        maintenance::spawn_maintenance(self)
    }

    /// Forget every session and handler. Secrets are zeroized as the
    /// sessions drop.
    pub fn dispose(&self) {
        let count = {
            let mut table = self.table.lock();
            let count = table.sessions.len();
            table.sessions.clear();
            count
        };
        self.events.clear();
        tracing::info!(target: "agora_e2ee", event = "manager_disposed", sessions = count);
    }
}

fn expired_event(session: &E2eeSession, reason: ExpiryReason) -> SessionEvent {
    SessionEvent::SessionExpired {
        session_id: session.id.clone(),
        remote_did: session.remote_did.clone(),
        reason,
    }
}

fn evict_oldest(table: &mut SessionTable) -> Option<SessionEvent> {
    let id = table.least_recently_active()?;
    let evicted = table.sessions.remove(&id)?;
    tracing::info!(
        target: "agora_e2ee",
        event = "session_evicted",
        session_id = %evicted.id,
        remote_did = %evicted.remote_did
    );
    Some(expired_event(&evicted, ExpiryReason::Evicted))
}

fn rotate_in_table(table: &mut SessionTable, id: &str, now: DateTime<Utc>) -> Option<SessionEvent> {
    let previous = table.sessions.remove(id)?;
    let tick = table.next_tick();
    let mut next = previous.rotated(now);
    next.activity_tick = tick;
    tracing::info!(
        target: "agora_e2ee",
        event = "session_rotated",
        previous_id = %previous.id,
        session_id = %next.id,
        generation = next.generation
    );
    let event = SessionEvent::SessionRotated {
        previous_id: previous.id.clone(),
        session_id: next.id.clone(),
        remote_did: next.remote_did.clone(),
    };
    table.sessions.insert(next.id.clone(), next);
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_idempotent_for_live_session() {
        let mgr = E2eeSessionManager::default();
        let a = AgentKeyPair::generate();
        let b = AgentKeyPair::generate();
        let s1 = mgr.create_session(&b.did(), b.public.as_bytes(), &a).unwrap();
        let s2 = mgr.create_session(&b.did(), b.public.as_bytes(), &a).unwrap();
        assert_eq!(s1.id, s2.id);
        assert_eq!(mgr.get_stats().total_sessions, 1);
    }

    #[test]
    fn bad_remote_key_is_rejected() {
        let mgr = E2eeSessionManager::default();
        let a = AgentKeyPair::generate();
        assert!(matches!(
            mgr.create_session("did:key:zX", &[1u8; 31], &a),
            Err(E2eeError::Crypto(_))
        ));
    }

    #[test]
    fn rotation_is_disabled_without_forward_secrecy() {
        let mgr = E2eeSessionManager::default();
        let a = AgentKeyPair::generate();
        let b = AgentKeyPair::generate();
        mgr.create_session(&b.did(), b.public.as_bytes(), &a).unwrap();
        let far_future = Utc::now() + chrono::Duration::days(1);
        assert_eq!(mgr.rotate_expired_keys_at(far_future), 0);
    }

    #[test]
    fn stats_on_empty_manager() {
        let stats = E2eeSessionManager::default().get_stats();
        assert_eq!(stats.total_sessions, 0);
        assert!(stats.oldest_session.is_none());
        let v = serde_json::to_value(&stats).unwrap();
        assert!(v.get("totalSessions").is_some());
    }
}
