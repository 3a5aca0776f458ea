//! Client facade wiring sessions, subscriptions, and connection state.
//!
//! A [`PulseLinkClient`] is built once per app with its backend
//! implementations injected, then hands out per-chat [`ChatSession`]s that
//! share the client's cache and timeout configuration. Nothing in here
//! reaches for globals; everything a session or subscription needs arrives
//! through the builder.

use crate::cache::MessageCache;
use crate::connection::{now_ms, ConnectionState, ConnectionStateStore};
use crate::error::{PulseLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::models::{ChangeEvent, ChannelKey, ReconnectOptions};
use crate::session::ChatSession;
use crate::store::{MessageStore, RealtimeTransport};
use crate::subscription::{SubscriptionConfig, SubscriptionManager};
use crate::timeouts::LinkTimeouts;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Buffer size for change-feed receivers handed out by
/// [`PulseLinkClient::subscribe_chat`].
const CHANGE_FEED_BUFFER: usize = 64;

/// Entry point for the realtime message layer.
///
/// # Examples
///
/// ```rust,no_run
/// # use pulse_link::{PulseLinkClient, EventHandlers, LinkTimeouts};
/// # use pulse_link::{MessageStore, RealtimeTransport, ContentKind};
/// # use std::sync::Arc;
/// # async fn example(
/// #     store: Arc<dyn MessageStore>,
/// #     transport: Arc<dyn RealtimeTransport>,
/// # ) -> pulse_link::Result<()> {
/// let client = PulseLinkClient::builder()
///     .store(store)
///     .transport(transport)
///     .timeouts(LinkTimeouts::default())
///     .event_handlers(EventHandlers::new().on_notice(|n| println!("{}", n)))
///     .build()?;
///
/// let session = Arc::new(client.session("chat_42"));
/// client.subscribe_session(session.clone()).await?;
/// session.load().await?;
/// session.send("Hello", ContentKind::Text).await?;
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct PulseLinkClient {
    store: Arc<dyn MessageStore>,
    conn: Arc<Mutex<ConnectionStateStore>>,
    subscriptions: SubscriptionManager,
    cache: Arc<Mutex<MessageCache>>,
    timeouts: LinkTimeouts,
    closed: AtomicBool,
}

impl PulseLinkClient {
    /// Create a builder.
    pub fn builder() -> PulseLinkClientBuilder {
        PulseLinkClientBuilder::new()
    }

    /// Create a session for a chat, sharing the client's cache and timeouts.
    pub fn session(&self, chat_id: impl Into<String>) -> ChatSession {
        ChatSession::new(chat_id, self.store.clone())
            .with_timeouts(self.timeouts.clone())
            .with_cache(self.cache.clone())
    }

    /// Subscribe to a chat's change feed, receiving events on a channel.
    ///
    /// Re-subscribing to the same chat replaces the previous feed; the old
    /// receiver goes quiet.
    pub async fn subscribe_chat(&self, chat_id: &str) -> Result<mpsc::Receiver<ChangeEvent>> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::channel(CHANGE_FEED_BUFFER);
        let config = SubscriptionConfig::new(ChannelKey::messages(chat_id)).on_change(move |event| {
            // A full or dropped receiver means the consumer went away; the
            // subscription itself stays healthy.
            if let Err(e) = tx.try_send(event) {
                log::debug!("Change feed receiver unavailable: {}", e);
            }
        });
        self.subscriptions.subscribe(config).await?;
        Ok(rx)
    }

    /// Subscribe a session to its own chat's change feed.
    ///
    /// Events are applied directly to the session, so placeholders are
    /// confirmed and remote messages appear without any manual plumbing.
    pub async fn subscribe_session(&self, session: Arc<ChatSession>) -> Result<()> {
        self.ensure_open()?;
        let key = ChannelKey::messages(session.chat_id());
        let config = SubscriptionConfig::new(key)
            .on_change(move |event| session.apply_change(event));
        self.subscriptions.subscribe(config).await
    }

    /// Subscribe with a custom configuration (arbitrary table and filter).
    pub async fn subscribe(&self, config: SubscriptionConfig) -> Result<()> {
        self.ensure_open()?;
        self.subscriptions.subscribe(config).await
    }

    /// Close the channel for a chat's change feed.
    pub async fn unsubscribe_chat(&self, chat_id: &str) -> Result<()> {
        self.subscriptions
            .unsubscribe(&ChannelKey::messages(chat_id))
            .await
    }

    /// Current connection state, with any due debounced transition applied.
    pub fn connection_state(&self) -> ConnectionState {
        self.conn.lock().unwrap().snapshot(now_ms())
    }

    /// Number of active subscription channels.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.active_count()
    }

    /// The client's timeout configuration.
    pub fn timeouts(&self) -> &LinkTimeouts {
        &self.timeouts
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear down every subscription and reset connection state.
    ///
    /// Idempotent; later calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Closing pulse-link client");
        self.subscriptions.cleanup().await;
        self.conn.lock().unwrap().reset();
        self.cache.lock().unwrap().clear();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(PulseLinkError::Internal("client is closed".to_string()));
        }
        Ok(())
    }
}

/// Builder for [`PulseLinkClient`].
#[derive(Default)]
pub struct PulseLinkClientBuilder {
    store: Option<Arc<dyn MessageStore>>,
    transport: Option<Arc<dyn RealtimeTransport>>,
    timeouts: LinkTimeouts,
    reconnect: ReconnectOptions,
    handlers: EventHandlers,
    cache_ttl: Option<Duration>,
}

impl PulseLinkClientBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Set the message store backend (required).
    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the realtime transport backend (required).
    pub fn transport(mut self, transport: Arc<dyn RealtimeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the timeout configuration.
    pub fn timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the reconnection options.
    pub fn reconnect_options(mut self, options: ReconnectOptions) -> Self {
        self.reconnect = options;
        self
    }

    /// Set the connection lifecycle handlers.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Override the message cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Build the client.
    ///
    /// Fails when a required backend was not provided.
    pub fn build(self) -> Result<PulseLinkClient> {
        let store = self
            .store
            .ok_or_else(|| PulseLinkError::Internal("a message store is required".to_string()))?;
        let transport = self.transport.ok_or_else(|| {
            PulseLinkError::Internal("a realtime transport is required".to_string())
        })?;

        let conn = Arc::new(Mutex::new(
            ConnectionStateStore::from_options(&self.reconnect).with_handlers(self.handlers),
        ));
        let subscriptions = SubscriptionManager::new(transport, conn.clone())
            .with_timeouts(self.timeouts.clone());
        let cache = match self.cache_ttl {
            Some(ttl) => MessageCache::with_ttl(ttl),
            None => MessageCache::new(),
        };

        Ok(PulseLinkClient {
            store,
            conn,
            subscriptions,
            cache: Arc::new(Mutex::new(cache)),
            timeouts: self.timeouts,
            closed: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelEvent, ChannelStatus, MessageDraft, MessageRecord};
    use async_trait::async_trait;

    struct NullStore;

    #[async_trait]
    impl MessageStore for NullStore {
        async fn insert_message(&self, draft: MessageDraft) -> Result<MessageRecord> {
            Ok(MessageRecord {
                id: format!("msg_{}", draft.sequence),
                chat_id: draft.chat_id,
                role: draft.role,
                content: draft.content,
                kind: draft.kind,
                sequence: draft.sequence,
                created_at_ms: now_ms(),
                client_ref: Some(draft.client_ref),
            })
        }

        async fn load_messages(&self, _chat_id: &str) -> Result<Vec<MessageRecord>> {
            Ok(Vec::new())
        }
    }

    struct NullTransport;

    #[async_trait]
    impl RealtimeTransport for NullTransport {
        async fn open_channel(&self, _key: &ChannelKey) -> Result<mpsc::Receiver<ChannelEvent>> {
            let (tx, rx) = mpsc::channel(4);
            let _ = tx.send(ChannelEvent::Status(ChannelStatus::Subscribed)).await;
            // The channel stays open for the life of the sender clone held
            // by the spawned keeper task.
            tokio::spawn(async move {
                tx.closed().await;
            });
            Ok(rx)
        }

        async fn close_channel(&self, _key: &ChannelKey) -> Result<()> {
            Ok(())
        }
    }

    fn client() -> PulseLinkClient {
        PulseLinkClient::builder()
            .store(Arc::new(NullStore))
            .transport(Arc::new(NullTransport))
            .timeouts(LinkTimeouts::fast())
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_store() {
        let result = PulseLinkClient::builder()
            .transport(Arc::new(NullTransport))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_transport() {
        let result = PulseLinkClient::builder().store(Arc::new(NullStore)).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = client();
        client.subscribe_chat("chat_1").await.unwrap();
        client.close().await;
        client.close().await;
        assert!(client.is_closed());
        assert_eq!(client.active_subscriptions(), 0);
        assert!(client.subscribe_chat("chat_1").await.is_err());
    }

    #[tokio::test]
    async fn test_sessions_share_the_cache() {
        let client = client();
        let a = client.session("chat_1");
        a.load().await.unwrap();
        let _ = a.send("Hello", crate::models::ContentKind::Text).await.unwrap();
        // A second session over the same chat sees the cached list without
        // a remote load (the null store would return an empty history).
        let b = client.session("chat_1");
        let messages = b.load().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Hello");
    }
}
