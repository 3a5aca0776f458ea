//! Records exchanged with the remote message store.

use super::message::{ContentKind, DeliveryStatus, Message, Role};
use serde::{Deserialize, Serialize};

/// Outbound message payload handed to the remote store for insertion.
///
/// Carries the client-generated temp id as `client_ref` so the backend can
/// round-trip it on the confirmed record and on subscription events; that is
/// how a change event delivered over a subscription is matched back to the
/// optimistic placeholder it confirms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    /// Target chat.
    pub chat_id: String,
    /// Author role.
    pub role: Role,
    /// Message body.
    pub content: String,
    /// Payload kind.
    pub kind: ContentKind,
    /// Client-generated temp id of the optimistic placeholder.
    pub client_ref: String,
    /// Sequence assigned at placeholder-creation time.
    pub sequence: u64,
}

/// A confirmed message row as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Server-assigned durable id.
    pub id: String,
    /// Chat the row belongs to.
    pub chat_id: String,
    /// Author role.
    pub role: Role,
    /// Message body.
    pub content: String,
    /// Payload kind.
    pub kind: ContentKind,
    /// Per-chat ordering key.
    pub sequence: u64,
    /// Server-assigned creation timestamp, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Temp id of the originating placeholder, when the row came from this
    /// client; absent for rows authored elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl MessageRecord {
    /// Convert into a confirmed, non-optimistic [`Message`].
    ///
    /// The server id and timestamp become canonical. The caller supplies the
    /// sequence: when this record confirms a placeholder, the placeholder's
    /// creation-time sequence is preserved.
    pub fn into_message(self, sequence: u64) -> Message {
        Message {
            id: self.id,
            chat_id: self.chat_id,
            role: self.role,
            content: self.content,
            kind: self.kind,
            status: DeliveryStatus::Delivered,
            sequence,
            created_at_ms: self.created_at_ms,
            is_optimistic: false,
            error: None,
            was_edited: false,
        }
    }
}
