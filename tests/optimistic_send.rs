//! End-to-end tests of the optimistic send flow against a scripted
//! in-process message store.

use async_trait::async_trait;
use pulse_link::{
    ChangeEvent, ChatSession, ContentKind, DeliveryStatus, LinkTimeouts, MessageDraft,
    MessageRecord, MessageStore, PulseLinkError, Result, Role,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted store: each insert consumes the next scripted response
/// (defaulting to success), and successful inserts build up the history
/// returned by `load_messages`.
struct ScriptedStore {
    failures: Mutex<VecDeque<String>>,
    history: Mutex<Vec<MessageRecord>>,
    insert_delay: Option<Duration>,
    inserts: AtomicU64,
    loads: AtomicU64,
}

impl ScriptedStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
            insert_delay: None,
            inserts: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        })
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
            insert_delay: Some(delay),
            inserts: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        })
    }

    /// Queue a failure for the next insert.
    fn fail_next(&self, reason: &str) {
        self.failures.lock().unwrap().push_back(reason.to_string());
    }

    fn seed(&self, record: MessageRecord) {
        self.history.lock().unwrap().push(record);
    }
}

#[async_trait]
impl MessageStore for ScriptedStore {
    async fn insert_message(&self, draft: MessageDraft) -> Result<MessageRecord> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.failures.lock().unwrap().pop_front() {
            return Err(PulseLinkError::Network(reason));
        }
        let record = MessageRecord {
            id: format!("msg_{}", n),
            chat_id: draft.chat_id,
            role: draft.role,
            content: draft.content,
            kind: draft.kind,
            sequence: draft.sequence,
            created_at_ms: 1_700_000_000_000 + n,
            client_ref: Some(draft.client_ref),
        };
        self.history.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn load_messages(&self, chat_id: &str) -> Result<Vec<MessageRecord>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.chat_id == chat_id)
            .cloned()
            .collect())
    }
}

fn record(id: &str, sequence: u64, content: &str) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        chat_id: "chat_1".to_string(),
        role: Role::User,
        content: content.to_string(),
        kind: ContentKind::Text,
        sequence,
        created_at_ms: 1_700_000_000_000,
        client_ref: None,
    }
}

#[tokio::test]
async fn test_send_replaces_placeholder_in_place() {
    let store = ScriptedStore::new();
    let session = ChatSession::new("chat_1", store);

    let confirmed = session.send("Hello", ContentKind::Text).await.unwrap();

    let messages = session.messages();
    assert_eq!(messages.len(), 1, "confirmation must replace, not append");
    assert_eq!(messages[0].id, confirmed.id);
    assert!(messages[0].id.starts_with("msg_"));
    assert_eq!(messages[0].status, DeliveryStatus::Delivered);
    assert!(!messages[0].is_optimistic);
    assert!(!session.is_processing());
}

#[tokio::test]
async fn test_burst_sends_keep_creation_order() {
    let store = ScriptedStore::with_delay(Duration::from_millis(20));
    let session = Arc::new(ChatSession::new("chat_1", store));

    let (a, b, c) = tokio::join!(
        session.send("one", ContentKind::Text),
        session.send("two", ContentKind::Text),
        session.send("three", ContentKind::Text),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
    let sequences: Vec<u64> = messages.iter().map(|m| m.sequence).collect();
    assert_eq!(
        sequences,
        vec![0, 1, 2],
        "sequences are assigned at creation time, in send order"
    );
    assert!(messages.iter().all(|m| m.status == DeliveryStatus::Delivered));
}

#[tokio::test]
async fn test_failed_send_is_kept_for_retry() {
    let store = ScriptedStore::new();
    store.fail_next("connection refused");
    let session = ChatSession::new("chat_1", store);

    let err = session.send("Hello", ContentKind::Text).await.unwrap_err();
    assert!(matches!(err, PulseLinkError::Network(_)));

    let messages = session.messages();
    assert_eq!(messages.len(), 1, "failed message must stay in the list");
    assert_eq!(messages[0].status, DeliveryStatus::Failed);
    assert_eq!(messages[0].error.as_deref(), Some("Network error: connection refused"));
    assert!(!session.is_processing(), "a settled failure is not pending");
}

#[tokio::test]
async fn test_retry_confirms_in_original_position() {
    let store = ScriptedStore::new();
    let session = ChatSession::new("chat_1", store.clone());

    session.send("first", ContentKind::Text).await.unwrap();
    store.fail_next("socket closed");
    session.send("second", ContentKind::Text).await.unwrap_err();
    session.send("third", ContentKind::Text).await.unwrap();

    let failed_id = session.messages()[1].id.clone();
    let confirmed = session.retry(&failed_id).await.unwrap();

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].id, confirmed.id);
    assert_eq!(messages[1].content, "second");
    assert_eq!(messages[1].sequence, 1, "retry keeps the original sequence");
    assert_eq!(messages[1].status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn test_retry_of_delivered_message_is_rejected() {
    let store = ScriptedStore::new();
    let session = ChatSession::new("chat_1", store);
    let confirmed = session.send("Hello", ContentKind::Text).await.unwrap();

    let err = session.retry(&confirmed.id).await.unwrap_err();
    assert!(matches!(err, PulseLinkError::Validation(_)));
}

#[tokio::test(start_paused = true)]
async fn test_send_timeout_marks_message_failed() {
    let store = ScriptedStore::with_delay(Duration::from_secs(60));
    let session = ChatSession::new("chat_1", store).with_timeouts(LinkTimeouts::default());

    let err = session.send("Hello", ContentKind::Text).await.unwrap_err();
    assert!(matches!(err, PulseLinkError::Timeout(_)));

    let messages = session.messages();
    assert_eq!(messages[0].status, DeliveryStatus::Failed);
    assert!(messages[0].error.is_some());
}

#[tokio::test]
async fn test_validation_rejects_before_anything_is_enqueued() {
    let store = ScriptedStore::new();
    let session = ChatSession::new("chat_1", store.clone());

    assert!(matches!(
        session.send("   ", ContentKind::Text).await,
        Err(PulseLinkError::Validation(_))
    ));
    let oversized = "x".repeat(4001);
    assert!(matches!(
        session.send(&oversized, ContentKind::Text).await,
        Err(PulseLinkError::Validation(_))
    ));

    assert!(session.messages().is_empty());
    assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_load_hits_the_cache() {
    let store = ScriptedStore::new();
    store.seed(record("msg_a", 0, "earlier"));
    let session = ChatSession::new("chat_1", store.clone());

    let first = session.load().await.unwrap();
    assert_eq!(first.len(), 1);
    let second = session.load().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(
        store.loads.load(Ordering::SeqCst),
        1,
        "a fresh cache entry must short-circuit the remote load"
    );
}

#[tokio::test]
async fn test_load_preserves_in_flight_send() {
    let store = ScriptedStore::with_delay(Duration::from_millis(50));
    let session = Arc::new(ChatSession::new("chat_1", store.clone()));
    store.seed(record("msg_a", 0, "earlier"));

    let sender = session.clone();
    let send = tokio::spawn(async move { sender.send("in flight", ContentKind::Text).await });
    // Let the placeholder land before loading.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let merged = session.load().await.unwrap();
    assert_eq!(merged.len(), 2, "pending send must survive a concurrent load");
    assert!(merged.iter().any(|m| m.content == "in flight"));

    send.await.unwrap().unwrap();
    assert_eq!(session.messages().len(), 2);
    assert!(session
        .messages()
        .iter()
        .all(|m| m.status == DeliveryStatus::Delivered));
}

#[tokio::test]
async fn test_aborted_load_leaves_state_untouched() {
    let store = ScriptedStore::with_delay(Duration::from_millis(200));
    store.seed(record("msg_a", 0, "earlier"));
    let session = ChatSession::new("chat_1", store);

    let (abort_tx, abort_rx) = tokio::sync::oneshot::channel();
    abort_tx.send(()).unwrap();
    let err = session.load_abortable(abort_rx).await.unwrap_err();
    assert!(matches!(err, PulseLinkError::Cancelled));
    assert!(session.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_feed_confirmation_beats_slow_insert_response() {
    let store = ScriptedStore::with_delay(Duration::from_secs(2));
    let session = Arc::new(ChatSession::new("chat_1", store));

    let sender = session.clone();
    let send = tokio::spawn(async move { sender.send("Hello", ContentKind::Text).await });
    while session.messages().is_empty() {
        tokio::task::yield_now().await;
    }

    let temp_id = session.messages()[0].id.clone();
    assert!(temp_id.starts_with("tmp_"));
    assert!(session.is_processing());

    // The subscription feed delivers the confirmed row before the insert
    // call returns.
    session.apply_change(ChangeEvent::Insert {
        record: MessageRecord {
            client_ref: Some(temp_id),
            ..record("msg_0", 0, "Hello")
        },
    });

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "msg_0");
    assert_eq!(messages[0].status, DeliveryStatus::Delivered);
    assert!(!session.is_processing());

    // When the insert response finally lands its confirmation finds no
    // placeholder and is discarded; the list must not grow.
    send.await.unwrap().unwrap();
    assert_eq!(session.messages().len(), 1);
}

#[tokio::test]
async fn test_remote_insert_appends_and_delete_is_ignored() {
    let store = ScriptedStore::new();
    let session = ChatSession::new("chat_1", store);
    session.send("mine", ContentKind::Text).await.unwrap();

    session.apply_change(ChangeEvent::Insert {
        record: record("msg_remote", 1, "from elsewhere"),
    });
    assert_eq!(session.messages().len(), 2);

    session.apply_change(ChangeEvent::Delete {
        id: "msg_remote".to_string(),
    });
    assert_eq!(session.messages().len(), 2, "deletes are not applied");
}
