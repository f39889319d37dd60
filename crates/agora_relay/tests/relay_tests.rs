use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agora_crypto::AgentKeyPair;
use agora_e2ee::SessionConfig;
use agora_proto::api::{AgentRegistration, DiscoverQuery};
use agora_proto::payload::TypedPayload;
use agora_proto::{EnvelopeBuilder, EnvelopeSigner, MessageType};
use agora_relay::transport::Query;
use agora_relay::{
    AgentRuntime, RelayClient, RelayConfig, RelayError, RelayTransport, RuntimeError,
    SubscribeOptions,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Recorded {
    method: &'static str,
    path: String,
    query: Query,
    body: Option<Value>,
    at: Instant,
}

impl Recorded {
    fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Counts hanging requests whose future has been dropped.
struct ReleaseOnDrop(Arc<AtomicUsize>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Replays canned responses in order, then hangs like an idle long-poll.
#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value, RelayError>>>,
    requests: Mutex<Vec<Recorded>>,
    released: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<Value, RelayError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    async fn answer(&self, rec: Recorded) -> Result<Value, RelayError> {
        self.requests.lock().push(rec);
        let next = self.script.lock().pop_front();
        match next {
            Some(res) => res,
            None => {
                let _hanging = ReleaseOnDrop(self.released.clone());
                std::future::pending().await
            }
        }
    }
}

#[async_trait]
impl RelayTransport for ScriptedTransport {
    async fn get(&self, path: &str, query: &Query) -> Result<Value, RelayError> {
        self.answer(Recorded {
            method: "GET",
            path: path.to_string(),
            query: query.clone(),
            body: None,
            at: Instant::now(),
        })
        .await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RelayError> {
        self.answer(Recorded {
            method: "POST",
            path: path.to_string(),
            query: Vec::new(),
            body: Some(body.clone()),
            at: Instant::now(),
        })
        .await
    }
}

fn client(transport: Arc<dyn RelayTransport>) -> RelayClient {
    RelayClient::with_transport(RelayConfig::new("http://relay.test"), transport)
}

fn event(id: &str, ts: &str) -> Value {
    json!({"id": id, "ts": ts, "type": "STATUS", "payload": {}})
}

#[tokio::test]
async fn cursor_advances_after_yield_and_on_idle_last_ts() {
    let transport = ScriptedTransport::new(vec![
        Ok(json!({"ok": true, "events": [event("e1", "t1"), event("e2", "t2")]})),
        Ok(json!({"ok": true, "events": [], "lastTs": "t3"})),
        Ok(json!({"ok": true, "events": [event("e3", "t4")]})),
    ]);
    let relay = client(transport.clone());
    let mut sub = relay.subscription(SubscribeOptions {
        since: Some("t0".into()),
        recipient: Some("did:key:zMe".into()),
        kind: Some(MessageType::Request),
        ..SubscribeOptions::default()
    });

    let first = sub.next_batch().await;
    assert_eq!(first.len(), 2);
    assert_eq!(sub.pending_cursor(), Some("t2"));
    assert_eq!(sub.cursor(), "t2");

    let second = sub.next_batch().await;
    assert_eq!(second[0]["id"], "e3");
    assert_eq!(sub.cursor(), "t4");

    let sent: Vec<String> = transport
        .requests()
        .iter()
        .map(|r| r.param("since").unwrap_or_default().to_string())
        .collect();
    assert_eq!(sent, vec!["t0", "t2", "t3"]);

    let reqs = transport.requests();
    let req = &reqs[0];
    assert_eq!((req.method, req.path.as_str()), ("GET", "/v1/messages"));
    assert_eq!(req.param("recipient"), Some("did:key:zMe"));
    assert_eq!(req.param("type"), Some("REQUEST"));
    assert_eq!(req.param("timeout"), Some("30"));
    assert_eq!(req.param("sender"), None);
}

#[tokio::test(start_paused = true)]
async fn failed_poll_backs_off_five_seconds() {
    let transport = ScriptedTransport::new(vec![
        Ok(json!({"ok": false, "error": "relay overloaded"})),
        Err(RelayError::Transport("connection reset".into())),
        Ok(json!({"ok": true, "events": [event("e1", "t1")]})),
    ]);
    let relay = client(transport.clone());
    let mut sub = relay.subscription(SubscribeOptions {
        since: Some("t0".into()),
        ..SubscribeOptions::default()
    });

    let batch = sub.next_batch().await;
    assert_eq!(batch.len(), 1);

    let reqs = transport.requests();
    assert_eq!(reqs.len(), 3);
    assert!(reqs[1].at - reqs[0].at >= Duration::from_millis(5000));
    assert!(reqs[2].at - reqs[1].at >= Duration::from_millis(5000));
    // A failed poll never moves the cursor.
    assert!(reqs.iter().all(|r| r.param("since") == Some("t0")));
}

#[tokio::test]
async fn default_since_is_now() {
    let transport = ScriptedTransport::new(vec![Ok(json!({"ok": true, "events": [event("e", "t9")]}))]);
    let relay = client(transport.clone());
    let mut sub = relay.subscription(SubscribeOptions::default());
    sub.next_batch().await;
    let since = transport.requests()[0].param("since").unwrap().to_string();
    assert!(since.ends_with('Z') && since.starts_with("20"));
}

#[tokio::test]
async fn stream_yields_batches_and_stops_on_drop() {
    let transport = ScriptedTransport::new(vec![
        Ok(json!({"ok": true, "events": [event("e1", "t1")]})),
        Ok(json!({"ok": true, "events": [event("e2", "t2")]})),
    ]);
    let relay = client(transport.clone());
    let mut stream = relay.subscribe_messages(SubscribeOptions {
        since: Some("t0".into()),
        ..SubscribeOptions::default()
    });
    assert_eq!(stream.next().await.unwrap()[0]["id"], "e1");
    assert_eq!(stream.next().await.unwrap()[0]["id"], "e2");

    // The third poll is the one left hanging.
    while transport.requests().len() < 3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.released(), 0);

    drop(stream);
    for _ in 0..100 {
        if transport.released() > 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.released(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let since: Vec<_> = transport
        .requests()
        .iter()
        .map(|r| r.param("since").unwrap().to_string())
        .collect();
    assert_eq!(since, vec!["t0", "t1", "t2"]);
}

#[tokio::test]
async fn legacy_subscribe_uses_events_path() {
    let transport = ScriptedTransport::new(vec![Ok(json!({"ok": true, "events": [event("e1", "t1")]}))]);
    let relay = client(transport.clone());
    let mut stream = relay.subscribe(SubscribeOptions::default());
    stream.next().await.unwrap();
    assert_eq!(transport.requests()[0].path, "/events");
}

#[tokio::test]
async fn submit_folds_failures() {
    let signer = EnvelopeSigner::new(AgentKeyPair::generate().secret_bytes()).unwrap();
    let env = EnvelopeBuilder::new()
        .id("m1")
        .kind(MessageType::Status)
        .sender_id(signer.did())
        .payload(json!({"state": "idle"}))
        .build()
        .unwrap();
    let signed = signer.sign(env).await.unwrap();

    let transport = ScriptedTransport::new(vec![
        Ok(json!({"ok": true, "id": "srv-1"})),
        Err(RelayError::Transport("dns failure".into())),
        Err(RelayError::Status {
            status: 502,
            body: "bad gateway".into(),
        }),
        Ok(json!("not an object")),
    ]);
    let relay = client(transport.clone());

    let ok = relay.submit_message(&signed).await;
    assert!(ok.ok);
    assert_eq!(ok.id.as_deref(), Some("srv-1"));
    let posted = transport.requests()[0].body.clone().unwrap();
    assert_eq!(posted["envelope"]["id"], "m1");
    assert_eq!(posted["envelope"]["sig"], signed.sig.as_str());

    let down = relay.submit_message(&signed).await;
    assert!(!down.ok);
    assert!(down.error.unwrap().contains("dns failure"));

    let gateway = relay.submit_event(&signed).await;
    assert!(!gateway.ok);
    assert!(gateway.error.unwrap().contains("502"));
    assert_eq!(transport.requests()[2].path, "/events");

    let garbage = relay.submit_message(&signed).await;
    assert!(!garbage.ok && garbage.error.is_some());
}

#[tokio::test]
async fn agent_rpcs() {
    let transport = ScriptedTransport::new(vec![
        Ok(json!({"ok": true, "id": "did:key:zA"})),
        Ok(json!({"ok": true, "agents": [{"id": "did:key:zB", "capabilities": ["ocr"]}]})),
        Ok(json!({"ok": true, "escrow": {"id": "esc-1", "state": "HELD"}})),
        Err(RelayError::Transport("timeout".into())),
    ]);
    let relay = client(transport.clone());

    let reg = relay
        .register_agent(&AgentRegistration {
            id: "did:key:zA".into(),
            name: Some("alpha".into()),
            ..AgentRegistration::default()
        })
        .await;
    assert!(reg.ok);

    let found = relay
        .discover_agents(&DiscoverQuery {
            capability: Some("ocr".into()),
            ..DiscoverQuery::default()
        })
        .await;
    assert_eq!(found.agents[0].capabilities, vec!["ocr".to_string()]);

    let escrow = relay.get_escrow("esc-1").await;
    assert_eq!(escrow.extra["escrow"]["state"], "HELD");

    let ledger = relay.get_ledger("did:key:zA").await;
    assert!(!ledger.ok);

    let reqs = transport.requests();
    assert_eq!(reqs[0].path, "/v1/agents");
    assert_eq!(reqs[0].body.as_ref().unwrap()["name"], "alpha");
    assert_eq!(reqs[1].param("capability"), Some("ocr"));
    assert_eq!(reqs[2].param("id"), Some("esc-1"));
    assert_eq!(reqs[3].param("agent"), Some("did:key:zA"));
}

/// Minimal in-memory relay: stores submitted envelopes and serves them to
/// polls filtered by recipient and `ts > since`. Empty polls never return.
#[derive(Default)]
struct MemoryRelay {
    stored: Mutex<Vec<Value>>,
}

#[async_trait]
impl RelayTransport for MemoryRelay {
    async fn get(&self, _path: &str, query: &Query) -> Result<Value, RelayError> {
        let param = |k: &str| query.iter().find(|(q, _)| *q == k).map(|(_, v)| v.clone());
        let since = param("since").unwrap_or_default();
        let recipient = param("recipient");
        let events: Vec<Value> = self
            .stored
            .lock()
            .iter()
            .filter(|e| e["ts"].as_str().unwrap_or("") > since.as_str())
            .filter(|e| match &recipient {
                Some(r) => e["recipient"]["id"].as_str() == Some(r.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        if events.is_empty() {
            // Hold the poll open like a real relay with nothing to deliver.
            return std::future::pending().await;
        }
        Ok(json!({"ok": true, "events": events}))
    }

    async fn post(&self, _path: &str, body: &Value) -> Result<Value, RelayError> {
        let envelope = body["envelope"].clone();
        let id = envelope["id"].clone();
        self.stored.lock().push(envelope);
        Ok(json!({"ok": true, "id": id}))
    }
}

fn runtime(relay: &Arc<MemoryRelay>) -> AgentRuntime {
    let key = AgentKeyPair::generate();
    AgentRuntime::new(key.secret_bytes(), SessionConfig::default(), client(relay.clone())).unwrap()
}

#[tokio::test]
async fn encrypted_request_reaches_peer() {
    let relay = Arc::new(MemoryRelay::default());
    let alice = runtime(&relay);
    let bob = runtime(&relay);

    let envelope = alice
        .envelope(&TypedPayload::request("echo", Some(json!({"text": "hi bob"}))))
        .recipient_id(bob.did())
        .thread("t-1", None)
        .build()
        .unwrap();
    let res = alice.send_encrypted(envelope).await.unwrap();
    assert!(res.ok);

    let on_wire = relay.stored.lock()[0].clone();
    assert_eq!(on_wire["encrypted"], true);
    assert!(on_wire["payload"].get("intent").is_none());

    let mut inbox = bob.subscribe_inbox(SubscribeOptions {
        since: Some("1970-01-01T00:00:00.000Z".into()),
        ..SubscribeOptions::default()
    });
    let batch = inbox.next().await.unwrap();
    let opened = bob.open_envelope(&batch[0]).unwrap();
    assert!(opened.was_encrypted);
    assert_eq!(opened.envelope.sender.id, alice.did());
    match opened.typed_payload() {
        TypedPayload::Request(r) => {
            assert_eq!(r.intent, "echo");
            assert_eq!(r.params, Some(json!({"text": "hi bob"})));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    // Redelivery of the same envelope is a replay.
    assert!(matches!(
        bob.open_envelope(&batch[0]),
        Err(RuntimeError::E2ee(agora_e2ee::E2eeError::Replay { .. }))
    ));
}

#[tokio::test]
async fn forged_envelope_is_rejected() {
    let relay = Arc::new(MemoryRelay::default());
    let alice = runtime(&relay);
    let bob = runtime(&relay);
    let envelope = alice
        .envelope(&TypedPayload::request("transfer", None))
        .recipient_id(bob.did())
        .build()
        .unwrap();
    alice.send(envelope).await.unwrap();

    let mut wire = relay.stored.lock()[0].clone();
    assert!(bob.open_envelope(&wire).is_ok());
    wire["payload"]["intent"] = json!("steal");
    assert!(matches!(
        bob.open_envelope(&wire),
        Err(RuntimeError::InvalidSignature)
    ));
}

#[tokio::test]
async fn sealed_box_between_runtimes() {
    let relay = Arc::new(MemoryRelay::default());
    let alice = runtime(&relay);
    let bob = runtime(&relay);
    let sealed = alice.seal_for(&bob.did(), b"escrow secret").unwrap();
    assert_eq!(bob.open_sealed(&sealed).unwrap(), b"escrow secret");
    assert!(alice.open_sealed(&sealed).is_err());
}

#[tokio::test]
async fn dispose_drops_sessions() {
    let relay = Arc::new(MemoryRelay::default());
    let alice = runtime(&relay);
    let bob = runtime(&relay);
    alice.start_maintenance();
    alice.open_session(&bob.did()).unwrap();
    assert_eq!(alice.sessions().get_stats().total_sessions, 1);
    alice.dispose();
    assert_eq!(alice.sessions().get_stats().total_sessions, 0);
}

#[test]
fn runtime_rejects_short_key() {
    let relay = Arc::new(MemoryRelay::default());
    let err = AgentRuntime::new(&[0u8; 16], SessionConfig::default(), client(relay)).unwrap_err();
    assert!(err.to_string().contains("32 bytes"));
}
