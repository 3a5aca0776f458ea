//! # pulse-link
//!
//! Realtime message-sync core for chat clients: optimistic sends with
//! in-place confirmation, supervised change-feed subscriptions, and
//! connection recovery with exponential backoff and a circuit breaker.
//!
//! The crate is backend-agnostic. Persistence and the realtime feed are
//! injected through the [`MessageStore`] and [`RealtimeTransport`] traits,
//! so the same state machine runs against a production backend or an
//! in-process fake.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pulse_link::{ContentKind, EventHandlers, PulseLinkClient};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     store: Arc<dyn pulse_link::MessageStore>,
//! #     transport: Arc<dyn pulse_link::RealtimeTransport>,
//! # ) -> pulse_link::Result<()> {
//! let client = PulseLinkClient::builder()
//!     .store(store)
//!     .transport(transport)
//!     .event_handlers(EventHandlers::new().on_notice(|notice| {
//!         // "Connection restored", "Reconnecting... (Attempt 2/5)", ...
//!         println!("{}", notice);
//!     }))
//!     .build()?;
//!
//! let session = Arc::new(client.session("chat_42"));
//! client.subscribe_session(session.clone()).await?;
//!
//! session.load().await?;
//! // The message appears in the list immediately and is confirmed in
//! // place once the backend acknowledges it.
//! session.send("Hello", ContentKind::Text).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pieces
//!
//! - [`ChatSession`]: per-chat optimistic send / load / change application
//! - [`SubscriptionManager`]: one supervised channel per (table, filter)
//! - [`ConnectionStateStore`]: debounced status transitions and notices
//! - [`BackoffPolicy`] and [`CircuitBreaker`]: retry pacing and gating
//! - [`MessageCache`]: per-chat TTL cache of loaded history

pub mod backoff;
pub mod cache;
pub mod circuit;
pub mod client;
pub mod connection;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod reducer;
pub mod session;
pub mod store;
pub mod subscription;
pub mod timeouts;
pub mod transaction;

pub use backoff::BackoffPolicy;
pub use cache::{MessageCache, DEFAULT_CACHE_TTL};
pub use circuit::{CircuitBreaker, CircuitState};
pub use client::{PulseLinkClient, PulseLinkClientBuilder};
pub use connection::{
    ConnectionState, ConnectionStateStore, ConnectionStatus, Recovery, DEBOUNCE_WINDOW,
};
pub use error::{PulseLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers, Notice};
pub use models::{
    ChangeEvent, ChannelEvent, ChannelKey, ChannelStatus, ContentKind, DeliveryStatus, Message,
    MessageDraft, MessageRecord, ReconnectOptions, Role,
};
pub use reducer::{MessageAction, MessageLog};
pub use session::{ChatSession, MAX_MESSAGE_LEN};
pub use store::{MessageStore, RealtimeTransport};
pub use subscription::{SubscriptionConfig, SubscriptionManager};
pub use timeouts::{LinkTimeouts, LinkTimeoutsBuilder};
pub use transaction::{SendTransaction, TransactionState};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
