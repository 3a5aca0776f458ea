//! Per-chat session: optimistic send, history load, and change-feed
//! application.
//!
//! A [`ChatSession`] owns the reducer state for one chat. Sends are
//! optimistic: the placeholder lands in the message list before the remote
//! write starts, and the confirmation replaces it in place. The remote write
//! carries the session's [`LinkTimeouts`] so a hung request resolves to a
//! failed (retryable) message instead of a permanent spinner.

use crate::cache::MessageCache;
use crate::connection::now_ms;
use crate::error::{PulseLinkError, Result};
use crate::models::{ChangeEvent, ContentKind, Message, MessageDraft, MessageRecord, Role};
use crate::reducer::{MessageAction, MessageLog};
use crate::store::MessageStore;
use crate::timeouts::LinkTimeouts;
use crate::transaction::{SendTransaction, TransactionState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Maximum message length in characters.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// State and operations for one chat.
pub struct ChatSession {
    chat_id: String,
    store: Arc<dyn MessageStore>,
    log: Mutex<MessageLog>,
    cache: Arc<Mutex<MessageCache>>,
    timeouts: LinkTimeouts,
    transactions: Mutex<HashMap<String, SendTransaction>>,
    temp_counter: AtomicU64,
}

impl ChatSession {
    /// Create a session for a chat backed by the given store.
    pub fn new(chat_id: impl Into<String>, store: Arc<dyn MessageStore>) -> Self {
        Self {
            chat_id: chat_id.into(),
            store,
            log: Mutex::new(MessageLog::new()),
            cache: Arc::new(Mutex::new(MessageCache::new())),
            timeouts: LinkTimeouts::default(),
            transactions: Mutex::new(HashMap::new()),
            temp_counter: AtomicU64::new(0),
        }
    }

    /// Override the timeout configuration.
    pub fn with_timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Share a cache with other sessions (the client hands every session the
    /// same cache so loads are deduplicated across views of the same chat).
    pub fn with_cache(mut self, cache: Arc<Mutex<MessageCache>>) -> Self {
        self.cache = cache;
        self
    }

    /// Send a message optimistically.
    ///
    /// Validation happens before anything is enqueued; a rejected message
    /// never appears in the list. The placeholder is added with its
    /// creation-time sequence before the remote write starts, so the list
    /// order reflects the order the user hit send, regardless of how the
    /// server interleaves confirmations. A failed or timed-out write leaves
    /// the message in the list as `failed`; nothing is retried automatically.
    pub async fn send(&self, content: &str, kind: ContentKind) -> Result<Message> {
        validate_content(content)?;

        let temp_id = self.next_temp_id();
        let now = now_ms();
        let sequence = {
            let mut log = self.log.lock().unwrap();
            let sequence = log.next_sequence();
            let placeholder =
                Message::placeholder(&temp_id, &self.chat_id, content, kind, sequence, now);
            log.apply(MessageAction::AddMessage(placeholder));
            sequence
        };

        let mut tx = SendTransaction::begin(&temp_id, now);
        tx.advance(TransactionState::Pending, now);
        self.transactions.lock().unwrap().insert(temp_id.clone(), tx);

        self.dispatch(&temp_id, content, kind, sequence).await
    }

    /// Retry a failed message.
    ///
    /// Only messages in the `failed` state can be retried; the message keeps
    /// its original sequence so a successful retry lands in its original
    /// position.
    pub async fn retry(&self, message_id: &str) -> Result<Message> {
        let (content, kind, sequence) = {
            let mut log = self.log.lock().unwrap();
            let msg = log.find(message_id).ok_or_else(|| {
                PulseLinkError::Validation(format!("unknown message {}", message_id))
            })?;
            if msg.status != crate::models::DeliveryStatus::Failed {
                return Err(PulseLinkError::Validation(format!(
                    "message {} is not in a failed state",
                    message_id
                )));
            }
            let out = (msg.content.clone(), msg.kind, msg.sequence);
            log.apply(MessageAction::RetryMessage {
                id: message_id.to_string(),
            });
            out
        };

        let now = now_ms();
        {
            let mut transactions = self.transactions.lock().unwrap();
            transactions
                .entry(message_id.to_string())
                .or_insert_with(|| SendTransaction::begin(message_id, now))
                .advance(TransactionState::Retrying, now);
        }

        self.dispatch(message_id, &content, kind, sequence).await
    }

    // Remote write shared by send and retry: insert under the send timeout,
    // then confirm in place or record the failure.
    async fn dispatch(
        &self,
        temp_id: &str,
        content: &str,
        kind: ContentKind,
        sequence: u64,
    ) -> Result<Message> {
        let draft = MessageDraft {
            chat_id: self.chat_id.clone(),
            role: Role::User,
            content: content.to_string(),
            kind,
            client_ref: temp_id.to_string(),
            sequence,
        };
        self.advance_transaction(temp_id, TransactionState::Processing);

        let written = timeout(self.timeouts.send_timeout, self.store.insert_message(draft)).await;
        match written {
            Ok(Ok(record)) => {
                let confirmed = record.into_message(sequence);
                {
                    let mut log = self.log.lock().unwrap();
                    log.apply(MessageAction::ConfirmMessage {
                        temp_id: temp_id.to_string(),
                        confirmed: confirmed.clone(),
                    });
                }
                self.advance_transaction(temp_id, TransactionState::Confirmed);
                self.refresh_cache();
                Ok(confirmed)
            }
            Ok(Err(e)) => {
                self.fail_message(temp_id, e.to_string());
                Err(e)
            }
            Err(_) => {
                let e = PulseLinkError::Timeout(format!(
                    "send timed out after {:?}",
                    self.timeouts.send_timeout
                ));
                self.fail_message(temp_id, e.to_string());
                Err(e)
            }
        }
    }

    fn fail_message(&self, id: &str, error: String) {
        log::warn!("Send failed for message {}: {}", id, error);
        {
            let mut log = self.log.lock().unwrap();
            log.apply(MessageAction::HandleFailure {
                id: id.to_string(),
                error,
            });
        }
        self.advance_transaction(id, TransactionState::Failed);
        self.refresh_cache();
    }

    /// Load the chat history, cache-first.
    ///
    /// A fresh cache entry short-circuits the remote call entirely. On a
    /// remote load the server list is merged with any still-pending
    /// optimistic sends, so an in-flight message is never dropped by a
    /// concurrent load.
    pub async fn load(&self) -> Result<Vec<Message>> {
        self.load_inner(None).await
    }

    /// Like [`load`](Self::load), but abortable. If the abort signal fires
    /// first the load resolves to [`PulseLinkError::Cancelled`] and the
    /// session state is left untouched.
    pub async fn load_abortable(&self, abort: oneshot::Receiver<()>) -> Result<Vec<Message>> {
        self.load_inner(Some(abort)).await
    }

    async fn load_inner(&self, abort: Option<oneshot::Receiver<()>>) -> Result<Vec<Message>> {
        let now = now_ms();
        let cached = self.cache.lock().unwrap().get(&self.chat_id, now).map(<[Message]>::to_vec);
        if let Some(messages) = cached {
            log::debug!("Loaded {} messages for chat {} from cache", messages.len(), self.chat_id);
            let mut log = self.log.lock().unwrap();
            log.apply(MessageAction::SetMessages(messages));
            return Ok(log.messages().to_vec());
        }

        let load = timeout(self.timeouts.load_timeout, self.store.load_messages(&self.chat_id));
        let loaded = match abort {
            Some(mut abort) => tokio::select! {
                biased;
                _ = &mut abort => {
                    log::debug!("Load aborted for chat {}", self.chat_id);
                    return Err(PulseLinkError::Cancelled);
                }
                res = load => res,
            },
            None => load.await,
        };

        match loaded {
            Ok(Ok(records)) => {
                let messages: Vec<Message> = records
                    .into_iter()
                    .map(|r| {
                        let sequence = r.sequence;
                        r.into_message(sequence)
                    })
                    .collect();
                let merged = {
                    let mut log = self.log.lock().unwrap();
                    log.apply(MessageAction::SetMessages(messages));
                    log.messages().to_vec()
                };
                self.cache
                    .lock()
                    .unwrap()
                    .insert(self.chat_id.clone(), merged.clone(), now_ms());
                Ok(merged)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PulseLinkError::Timeout(format!(
                "load timed out after {:?}",
                self.timeouts.load_timeout
            ))),
        }
    }

    /// Apply a change-feed event to the session state.
    ///
    /// An insert or update carrying this session's `client_ref` confirms the
    /// matching placeholder. Inserts for unknown rows are appended (messages
    /// authored elsewhere); updates for unknown rows and all deletes are
    /// logged and ignored.
    pub fn apply_change(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert { record } => self.apply_upsert(record, true),
            ChangeEvent::Update { record } => self.apply_upsert(record, false),
            ChangeEvent::Delete { id } => {
                log::debug!("Ignoring delete event for message {}", id);
            }
        }
        self.refresh_cache();
    }

    fn apply_upsert(&self, record: MessageRecord, insert: bool) {
        let mut log = self.log.lock().unwrap();
        let client_ref = record
            .client_ref
            .clone()
            .filter(|temp_id| log.find(temp_id).is_some());
        if let Some(temp_id) = client_ref {
            let sequence = log
                .find(&temp_id)
                .map(|m| m.sequence)
                .unwrap_or(record.sequence);
            log.apply(MessageAction::ConfirmMessage {
                temp_id: temp_id.clone(),
                confirmed: record.into_message(sequence),
            });
            drop(log);
            // Confirmation can arrive over the feed before the insert
            // response resolves; settle the transaction either way.
            if let Some(tx) = self.transactions.lock().unwrap().get_mut(&temp_id) {
                if !tx.is_settled() {
                    tx.advance(TransactionState::Confirmed, now_ms());
                }
            }
            return;
        }

        let known = log.find(&record.id).is_some();
        if known {
            let sequence = log
                .find(&record.id)
                .map(|m| m.sequence)
                .unwrap_or(record.sequence);
            let id = record.id.clone();
            log.apply(MessageAction::ConfirmMessage {
                temp_id: id,
                confirmed: record.into_message(sequence),
            });
        } else if insert {
            let sequence = log.next_sequence().max(record.sequence);
            log.apply(MessageAction::AddMessage(record.into_message(sequence)));
        } else {
            log::debug!("Ignoring update for unknown message {}", record.id);
        }
    }

    fn refresh_cache(&self) {
        let snapshot = self.log.lock().unwrap().messages().to_vec();
        self.cache
            .lock()
            .unwrap()
            .insert(self.chat_id.clone(), snapshot, now_ms());
    }

    fn advance_transaction(&self, id: &str, state: TransactionState) {
        if let Some(tx) = self.transactions.lock().unwrap().get_mut(id) {
            tx.advance(state, now_ms());
        }
    }

    // Temp ids must be unique within the process even when two sends land on
    // the same nanosecond tick.
    fn next_temp_id(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let count = self.temp_counter.fetch_add(1, Ordering::SeqCst);
        format!("tmp_{}_{}", nanos, count)
    }

    /// Begin editing a message.
    pub fn start_edit(&self, message_id: &str) {
        self.log.lock().unwrap().apply(MessageAction::StartEdit {
            id: message_id.to_string(),
        });
    }

    /// Apply new content to the message being edited.
    pub fn save_edit(&self, content: &str) {
        self.log.lock().unwrap().apply(MessageAction::SaveEdit {
            content: content.to_string(),
        });
        self.refresh_cache();
    }

    /// Abandon the in-progress edit.
    pub fn cancel_edit(&self) {
        self.log.lock().unwrap().apply(MessageAction::CancelEdit);
    }

    /// Reset the session to its initial empty state.
    pub fn clear(&self) {
        self.log.lock().unwrap().apply(MessageAction::ClearMessages);
        self.transactions.lock().unwrap().clear();
        self.cache.lock().unwrap().invalidate(&self.chat_id);
    }

    /// Snapshot of the current message list.
    pub fn messages(&self) -> Vec<Message> {
        self.log.lock().unwrap().messages().to_vec()
    }

    /// Whether any optimistic send is awaiting confirmation.
    pub fn is_processing(&self) -> bool {
        self.log.lock().unwrap().is_processing()
    }

    /// The chat this session belongs to.
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Transaction history for a message, if one was sent by this session.
    pub fn transaction(&self, message_id: &str) -> Option<SendTransaction> {
        self.transactions.lock().unwrap().get(message_id).cloned()
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(PulseLinkError::Validation(
            "message content is empty".to_string(),
        ));
    }
    let len = content.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(PulseLinkError::Validation(format!(
            "message content is {} characters; the maximum is {}",
            len, MAX_MESSAGE_LEN
        )));
    }
    Ok(())
}
