//! Long-poll subscription with a client-side cursor.
//!
//! Delivery is at-least-once. The cursor (`since`) moves to the `ts` of the
//! last event of a batch only when the caller comes back for the next batch,
//! so a crash while handling a batch replays it rather than losing it. An
//! empty poll that carries `lastTs` moves the cursor immediately. Failed polls
//! (transport error or `ok: false`) sleep a fixed backoff and retry forever;
//! nothing is surfaced to the caller.

use std::sync::Arc;
use std::time::Duration;

use agora_proto::builder::now_ts;
use agora_proto::MessageType;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use agora_proto::api::PollResponse;

use crate::transport::{Query, RelayTransport};

/// One non-empty poll result, raw JSON so extension fields stay verifiable.
pub type EventBatch = Vec<Value>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Start cursor; defaults to the current time.
    pub since: Option<String>,
    pub recipient: Option<String>,
    pub sender: Option<String>,
    pub kind: Option<MessageType>,
    pub thread: Option<String>,
    /// Server-side long-poll wait; defaults to the client config.
    pub timeout_secs: Option<u64>,
}

impl SubscribeOptions {
    pub fn for_recipient(recipient: impl Into<String>) -> Self {
        Self {
            recipient: Some(recipient.into()),
            ..Self::default()
        }
    }

    pub(crate) fn query(&self, since: &str, default_timeout_secs: u64) -> Query {
        let mut q: Query = vec![("since", since.to_string())];
        if let Some(r) = &self.recipient {
            q.push(("recipient", r.clone()));
        }
        if let Some(s) = &self.sender {
            q.push(("sender", s.clone()));
        }
        if let Some(k) = self.kind {
            q.push(("type", k.as_str().to_string()));
        }
        if let Some(t) = &self.thread {
            q.push(("thread", t.clone()));
        }
        q.push((
            "timeout",
            self.timeout_secs.unwrap_or(default_timeout_secs).to_string(),
        ));
        q
    }
}

/// Explicit cursor state for one subscription. Owned by one task; drive it
/// with [`Subscription::next_batch`].
pub struct Subscription {
    transport: Arc<dyn RelayTransport>,
    path: &'static str,
    options: SubscribeOptions,
    since: String,
    pending: Option<String>,
    long_poll_secs: u64,
    backoff: Duration,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("since", &self.since)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub(crate) fn new(
        transport: Arc<dyn RelayTransport>,
        path: &'static str,
        options: SubscribeOptions,
        long_poll_secs: u64,
        backoff: Duration,
    ) -> Self {
        let since = options.since.clone().unwrap_or_else(now_ts);
        Self {
            transport,
            path,
            options,
            since,
            pending: None,
            long_poll_secs,
            backoff,
        }
    }

    /// Cursor sent with the next request.
    pub fn cursor(&self) -> &str {
        self.pending.as_deref().unwrap_or(&self.since)
    }

    /// Cursor of the last yielded batch, not yet committed.
    pub fn pending_cursor(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Wait for the next non-empty batch. Never fails; retries until the
    /// relay delivers.
    pub async fn next_batch(&mut self) -> EventBatch {
        if let Some(next) = self.pending.take() {
            self.since = next;
        }
        loop {
            let query = self.options.query(&self.since, self.long_poll_secs);
            let poll = match self.transport.get(self.path, &query).await {
                Ok(body) => serde_json::from_value::<PollResponse>(body)
                    .unwrap_or_else(|e| PollResponse::failure(e.to_string())),
                Err(err) => PollResponse::failure(err.to_string()),
            };

            if !poll.ok {
                tracing::warn!(
                    target: "agora_relay",
                    event = "poll_failed",
                    path = self.path,
                    since = %self.since,
                    error = poll.error.as_deref().unwrap_or("unknown"),
                    backoff_ms = self.backoff.as_millis() as u64
                );
                tokio::time::sleep(self.backoff).await;
                continue;
            }

            if poll.events.is_empty() {
                if let Some(last_ts) = poll.last_ts {
                    self.since = last_ts;
                }
                continue;
            }

            let last_event_ts = poll
                .events
                .last()
                .and_then(|e| e.get("ts"))
                .and_then(Value::as_str)
                .map(str::to_owned);
            self.pending = last_event_ts.or(poll.last_ts);
            tracing::debug!(
                target: "agora_relay",
                event = "poll_batch",
                path = self.path,
                count = poll.events.len(),
                since = %self.since
            );
            return poll.events;
        }
    }

    /// Move the subscription onto a task and receive batches over a channel.
    pub fn spawn(self) -> MessageStream {
        MessageStream::spawn(self)
    }
}

/// Channel-backed subscription. Dropping it aborts the polling task and any
/// in-flight request.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<EventBatch>,
    task: JoinHandle<()>,
}

impl MessageStream {
    fn spawn(mut subscription: Subscription) -> Self {
        // Capacity 1: the task commits a batch's cursor only after handing it
        // over and coming back for the next one.
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            loop {
                let batch = subscription.next_batch().await;
                if tx.send(batch).await.is_err() {
                    break;
                }
            }
        });
        Self { rx, task }
    }

    /// Next batch. `None` only if the polling task has gone away.
    pub async fn next(&mut self) -> Option<EventBatch> {
        self.rx.recv().await
    }

    pub fn close(self) {}
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
