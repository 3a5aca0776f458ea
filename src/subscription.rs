//! Subscription manager: one supervised channel per (table, filter) key.
//!
//! Each logical subscription is identified by a [`ChannelKey`]. The manager
//! enforces single-active-channel-per-key: subscribing with a key that is
//! already active tears down the prior channel before opening the new one,
//! so duplicate event delivery is impossible by construction.
//!
//! Every channel runs under a supervision task that reopens it after
//! transport failures, driven by the shared [`ConnectionStateStore`] for
//! backoff delays and circuit-breaker gating. Generation counters keep a
//! stale task from tearing down its replacement.

use crate::connection::{now_ms, ConnectionStateStore, Recovery};
use crate::error::{PulseLinkError, Result};
use crate::models::{ChangeEvent, ChannelEvent, ChannelKey, ChannelStatus};
use crate::store::RealtimeTransport;
use crate::timeouts::LinkTimeouts;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};

/// How often a supervision task re-checks a tripped circuit breaker.
const BREAKER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Callback invoked for each row-level change on a channel.
pub type OnChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;
/// Callback invoked when a channel attempt fails.
pub type OnChannelErrorCallback = Arc<dyn Fn(PulseLinkError) + Send + Sync>;
/// Callback invoked on channel status changes.
pub type OnChannelStatusCallback = Arc<dyn Fn(ChannelStatus) + Send + Sync>;

/// Configuration for one subscription.
#[derive(Clone)]
pub struct SubscriptionConfig {
    /// Identity of the channel.
    pub key: ChannelKey,
    on_change: Option<OnChangeCallback>,
    on_error: Option<OnChannelErrorCallback>,
    on_status: Option<OnChannelStatusCallback>,
}

impl SubscriptionConfig {
    /// Create a configuration for the given key with no callbacks.
    pub fn new(key: ChannelKey) -> Self {
        Self {
            key,
            on_change: None,
            on_error: None,
            on_status: None,
        }
    }

    /// Register the change callback.
    pub fn on_change(mut self, f: impl Fn(ChangeEvent) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(f));
        self
    }

    /// Register the error callback.
    pub fn on_error(mut self, f: impl Fn(PulseLinkError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register the status callback.
    pub fn on_status(mut self, f: impl Fn(ChannelStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(f));
        self
    }

    fn emit_change(&self, event: ChangeEvent) {
        if let Some(cb) = &self.on_change {
            cb(event);
        }
    }

    fn emit_error(&self, error: PulseLinkError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    fn emit_status(&self, status: ChannelStatus) {
        if let Some(cb) = &self.on_status {
            cb(status);
        }
    }
}

struct ActiveChannel {
    generation: u64,
    shutdown: oneshot::Sender<()>,
}

/// Registry and supervisor of active subscription channels.
pub struct SubscriptionManager {
    transport: Arc<dyn RealtimeTransport>,
    conn: Arc<Mutex<ConnectionStateStore>>,
    timeouts: LinkTimeouts,
    channels: Arc<Mutex<HashMap<ChannelKey, ActiveChannel>>>,
    next_generation: AtomicU64,
}

impl SubscriptionManager {
    /// Create a manager over the given transport and connection store.
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        conn: Arc<Mutex<ConnectionStateStore>>,
    ) -> Self {
        Self {
            transport,
            conn,
            timeouts: LinkTimeouts::default(),
            channels: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Override the timeout configuration.
    pub fn with_timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Open a supervised channel for the config's key.
    ///
    /// If a channel is already active for the key it is torn down first;
    /// there is never more than one live channel per key.
    pub async fn subscribe(&self, config: SubscriptionConfig) -> Result<()> {
        self.teardown(&config.key).await;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        {
            let mut channels = self.channels.lock().unwrap();
            channels.insert(
                config.key.clone(),
                ActiveChannel {
                    generation,
                    shutdown: shutdown_tx,
                },
            );
        }
        log::debug!("Subscribing to {} (generation {})", config.key, generation);

        tokio::spawn(run_channel(
            self.transport.clone(),
            self.conn.clone(),
            self.channels.clone(),
            self.timeouts.clone(),
            config,
            generation,
            shutdown_rx,
        ));
        Ok(())
    }

    /// Close the channel for a key. Unknown keys are a no-op.
    pub async fn unsubscribe(&self, key: &ChannelKey) -> Result<()> {
        if self.teardown(key).await {
            log::debug!("Unsubscribed from {}", key);
        }
        Ok(())
    }

    /// Close every active channel.
    pub async fn cleanup(&self) {
        let keys: Vec<ChannelKey> = {
            let channels = self.channels.lock().unwrap();
            channels.keys().cloned().collect()
        };
        for key in keys {
            self.teardown(&key).await;
        }
        log::debug!("Subscription cleanup complete");
    }

    /// Number of active channels.
    pub fn active_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    /// Whether a channel is active for the key.
    pub fn is_subscribed(&self, key: &ChannelKey) -> bool {
        self.channels.lock().unwrap().contains_key(key)
    }

    // Remove the entry for a key, signal its task, and close the transport
    // channel. Returns whether an entry existed.
    async fn teardown(&self, key: &ChannelKey) -> bool {
        let entry = self.channels.lock().unwrap().remove(key);
        match entry {
            Some(active) => {
                let _ = active.shutdown.send(());
                if let Err(e) = self.transport.close_channel(key).await {
                    log::warn!("Failed to close channel {}: {}", key, e);
                }
                true
            }
            None => false,
        }
    }
}

// Supervision loop for one channel. Opens the transport channel, pumps its
// events into the config callbacks, and on failure reopens it under the
// shared backoff/breaker policy. Exits on shutdown signal or when reconnect
// attempts are exhausted.
async fn run_channel(
    transport: Arc<dyn RealtimeTransport>,
    conn: Arc<Mutex<ConnectionStateStore>>,
    channels: Arc<Mutex<HashMap<ChannelKey, ActiveChannel>>>,
    timeouts: LinkTimeouts,
    config: SubscriptionConfig,
    generation: u64,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        // Wait out a tripped breaker without consuming backoff attempts.
        loop {
            let allowed = conn.lock().unwrap().can_attempt(now_ms());
            if allowed {
                break;
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    remove_if_current(&channels, &config.key, generation);
                    return;
                }
                _ = sleep(BREAKER_POLL_INTERVAL) => {}
            }
        }

        conn.lock().unwrap().begin_connect(now_ms());
        let opened = tokio::select! {
            biased;
            _ = &mut shutdown => {
                remove_if_current(&channels, &config.key, generation);
                return;
            }
            res = timeout(timeouts.subscribe_timeout, transport.open_channel(&config.key)) => res,
        };

        let failure = match opened {
            Ok(Ok(mut rx)) => {
                match pump_events(&conn, &config, &mut rx, &mut shutdown).await {
                    PumpExit::Shutdown => {
                        remove_if_current(&channels, &config.key, generation);
                        return;
                    }
                    PumpExit::Failed(reason) => reason,
                }
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "channel open timed out after {:?}",
                timeouts.subscribe_timeout
            ),
        };

        config.emit_error(PulseLinkError::Subscription(failure.clone()));
        let recovery = conn.lock().unwrap().handle_error(now_ms(), failure);
        match recovery {
            Recovery::RetryAfter(delay) => {
                if wait_and_commit(&conn, delay, &mut shutdown).await {
                    remove_if_current(&channels, &config.key, generation);
                    return;
                }
            }
            Recovery::Exhausted => {
                // Let the terminal transition commit before going quiet.
                let window = conn.lock().unwrap().debounce_window();
                let _ = wait_and_commit(&conn, window, &mut shutdown).await;
                config.emit_error(PulseLinkError::ConnectionExhausted(format!(
                    "giving up on {} after repeated failures",
                    config.key
                )));
                log::error!("Subscription to {} exhausted reconnect attempts", config.key);
                remove_if_current(&channels, &config.key, generation);
                return;
            }
        }
    }
}

enum PumpExit {
    Shutdown,
    Failed(String),
}

// Deliver channel events to the callbacks until the channel fails, closes,
// or shutdown is signalled.
async fn pump_events(
    conn: &Arc<Mutex<ConnectionStateStore>>,
    config: &SubscriptionConfig,
    rx: &mut mpsc::Receiver<ChannelEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) -> PumpExit {
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut *shutdown => return PumpExit::Shutdown,
            event = rx.recv() => event,
        };
        match event {
            Some(ChannelEvent::Status(ChannelStatus::Subscribed)) => {
                conn.lock().unwrap().handle_success(now_ms());
                config.emit_status(ChannelStatus::Subscribed);
            }
            Some(ChannelEvent::Status(ChannelStatus::ChannelError(reason))) => {
                config.emit_status(ChannelStatus::ChannelError(reason.clone()));
                return PumpExit::Failed(reason);
            }
            Some(ChannelEvent::Status(ChannelStatus::Closed)) => {
                config.emit_status(ChannelStatus::Closed);
                return PumpExit::Failed(format!("channel {} closed by transport", config.key));
            }
            Some(ChannelEvent::Change(change)) => {
                config.emit_change(change);
            }
            None => {
                return PumpExit::Failed(format!("channel {} dropped", config.key));
            }
        }
    }
}

// Sleep for `delay`, committing the pending debounced transition once its
// window elapses. Returns true if shutdown fired during the wait.
async fn wait_and_commit(
    conn: &Arc<Mutex<ConnectionStateStore>>,
    delay: Duration,
    shutdown: &mut oneshot::Receiver<()>,
) -> bool {
    let window = conn.lock().unwrap().debounce_window();
    let first = delay.min(window);
    tokio::select! {
        biased;
        _ = &mut *shutdown => return true,
        _ = sleep(first) => {}
    }
    conn.lock().unwrap().snapshot(now_ms());
    if delay > first {
        tokio::select! {
            biased;
            _ = &mut *shutdown => return true,
            _ = sleep(delay - first) => {}
        }
        conn.lock().unwrap().snapshot(now_ms());
    }
    false
}

// Generation check keeps a superseded task from removing its replacement's
// registry entry.
fn remove_if_current(
    channels: &Arc<Mutex<HashMap<ChannelKey, ActiveChannel>>>,
    key: &ChannelKey,
    generation: u64,
) {
    let mut channels = channels.lock().unwrap();
    if channels
        .get(key)
        .is_some_and(|active| active.generation == generation)
    {
        channels.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeTransport {
        opened: Mutex<Vec<ChannelKey>>,
        closed: Mutex<Vec<ChannelKey>>,
        // Senders are retained so opened channels stay live.
        senders: Mutex<Vec<mpsc::Sender<ChannelEvent>>>,
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                opened: Mutex::new(Vec::new()),
                closed: Mutex::new(Vec::new()),
                senders: Mutex::new(Vec::new()),
            })
        }

        fn opened_count(&self) -> usize {
            self.opened.lock().unwrap().len()
        }

        fn closed_count(&self) -> usize {
            self.closed.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RealtimeTransport for FakeTransport {
        async fn open_channel(&self, key: &ChannelKey) -> Result<mpsc::Receiver<ChannelEvent>> {
            self.opened.lock().unwrap().push(key.clone());
            let (tx, rx) = mpsc::channel(8);
            let _ = tx
                .send(ChannelEvent::Status(ChannelStatus::Subscribed))
                .await;
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }

        async fn close_channel(&self, key: &ChannelKey) -> Result<()> {
            self.closed.lock().unwrap().push(key.clone());
            Ok(())
        }
    }

    fn manager(transport: Arc<FakeTransport>) -> SubscriptionManager {
        let conn = Arc::new(Mutex::new(ConnectionStateStore::new()));
        SubscriptionManager::new(transport, conn).with_timeouts(LinkTimeouts::fast())
    }

    #[tokio::test]
    async fn test_subscribe_registers_single_channel() {
        let transport = FakeTransport::new();
        let mgr = manager(transport.clone());
        let key = ChannelKey::messages("chat_1");
        mgr.subscribe(SubscriptionConfig::new(key.clone()))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        assert!(mgr.is_subscribed(&key));
        assert_eq!(mgr.active_count(), 1);
        assert_eq!(transport.opened_count(), 1);
    }

    #[tokio::test]
    async fn test_resubscribe_tears_down_prior_channel() {
        let transport = FakeTransport::new();
        let mgr = manager(transport.clone());
        let key = ChannelKey::messages("chat_1");
        mgr.subscribe(SubscriptionConfig::new(key.clone()))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        mgr.subscribe(SubscriptionConfig::new(key.clone()))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        assert_eq!(mgr.active_count(), 1, "one channel per key");
        assert_eq!(transport.opened_count(), 2);
        assert_eq!(
            transport.closed_count(),
            1,
            "prior channel must be closed before the replacement opens"
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_channel() {
        let transport = FakeTransport::new();
        let mgr = manager(transport.clone());
        let key = ChannelKey::messages("chat_1");
        mgr.subscribe(SubscriptionConfig::new(key.clone()))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        mgr.unsubscribe(&key).await.unwrap();
        assert!(!mgr.is_subscribed(&key));
        assert_eq!(transport.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_key_is_noop() {
        let transport = FakeTransport::new();
        let mgr = manager(transport.clone());
        mgr.unsubscribe(&ChannelKey::messages("chat_missing"))
            .await
            .unwrap();
        assert_eq!(transport.closed_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_drains_all_channels() {
        let transport = FakeTransport::new();
        let mgr = manager(transport.clone());
        mgr.subscribe(SubscriptionConfig::new(ChannelKey::messages("chat_1")))
            .await
            .unwrap();
        mgr.subscribe(SubscriptionConfig::new(ChannelKey::messages("chat_2")))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        mgr.cleanup().await;
        assert_eq!(mgr.active_count(), 0);
        assert_eq!(transport.closed_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_are_independent() {
        let transport = FakeTransport::new();
        let mgr = manager(transport.clone());
        let key_a = ChannelKey::messages("chat_a");
        let key_b = ChannelKey::messages("chat_b");
        mgr.subscribe(SubscriptionConfig::new(key_a.clone()))
            .await
            .unwrap();
        mgr.subscribe(SubscriptionConfig::new(key_b.clone()))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        assert_eq!(mgr.active_count(), 2);
        mgr.unsubscribe(&key_a).await.unwrap();
        assert!(!mgr.is_subscribed(&key_a));
        assert!(mgr.is_subscribed(&key_b), "other keys must be untouched");
    }
}
