//! Backend seams: persistence and realtime transport traits.
//!
//! pulse-link is backend-agnostic. The send/load paths talk to a
//! [`MessageStore`] and the subscription layer talks to a
//! [`RealtimeTransport`]; both are injected at client construction, which is
//! also what makes the whole flow testable with in-process fakes.

use crate::error::Result;
use crate::models::{ChannelEvent, ChannelKey, MessageDraft, MessageRecord};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Remote persistence for chat messages.
///
/// Implementations map these calls onto their backend of choice (an HTTP
/// API, a database driver, a test fake). Errors should be returned as
/// [`Network`](crate::PulseLinkError::Network) or
/// [`Serialization`](crate::PulseLinkError::Serialization) as appropriate;
/// per-request timeouts are enforced by the caller, not here.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert one message and return the confirmed row.
    ///
    /// The returned record must echo the draft's `client_ref` so the caller
    /// can match it back to the optimistic placeholder.
    async fn insert_message(&self, draft: MessageDraft) -> Result<MessageRecord>;

    /// Load the full message history for a chat, ordered by sequence.
    async fn load_messages(&self, chat_id: &str) -> Result<Vec<MessageRecord>>;
}

/// Realtime change-feed transport.
///
/// A channel delivers [`ChannelEvent`]s for one [`ChannelKey`] until it is
/// closed or fails; the subscription layer owns reconnection, so an
/// implementation only needs to report errors through
/// [`ChannelStatus`](crate::models::ChannelStatus) and let the receiver drop.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open a channel for the given key.
    ///
    /// The transport should emit `ChannelStatus::Subscribed` once the
    /// channel is live.
    async fn open_channel(&self, key: &ChannelKey) -> Result<mpsc::Receiver<ChannelEvent>>;

    /// Close the channel for the given key. Closing an unknown key is a
    /// no-op.
    async fn close_channel(&self, key: &ChannelKey) -> Result<()>;
}
