//! Chat message model and the delivery-status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The clinician using the app.
    User,
    /// The AI assistant.
    Assistant,
    /// System-generated content (notices, context).
    System,
}

/// Payload kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Plain text.
    Text,
    /// Transcribed voice dictation.
    Audio,
}

/// Delivery status of a message.
///
/// Transitions are restricted to a fixed table enforced by
/// [`can_transition_to`](DeliveryStatus::can_transition_to) — the one
/// explicit state machine in the system. Callers never apply transitions
/// themselves; the reducer is the single enforcement point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Created locally, not yet handed to the network layer.
    Queued,
    /// Remote write in flight.
    Sending,
    /// Confirmed by the backend.
    Delivered,
    /// Remote write failed; retry is available.
    Failed,
    /// Read by the recipient. Terminal.
    Seen,
}

impl DeliveryStatus {
    /// Legal transition table:
    ///
    /// | from      | to                  |
    /// |-----------|---------------------|
    /// | Queued    | Sending, Failed     |
    /// | Sending   | Delivered, Failed   |
    /// | Delivered | Seen, Failed        |
    /// | Failed    | Sending             |
    /// | Seen      | (terminal)          |
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Queued, Sending)
                | (Queued, Failed)
                | (Sending, Delivered)
                | (Sending, Failed)
                | (Delivered, Seen)
                | (Delivered, Failed)
                | (Failed, Sending)
        )
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        self == DeliveryStatus::Seen
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Queued => write!(f, "queued"),
            DeliveryStatus::Sending => write!(f, "sending"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Failed => write!(f, "failed"),
            DeliveryStatus::Seen => write!(f, "seen"),
        }
    }
}

/// A single chat message.
///
/// Exactly one `Message` exists per logical message at any time: optimistic
/// placeholders are replaced in place by their confirmed counterpart, never
/// duplicated. `sequence` is assigned synchronously at creation time and
/// never reassigned, so ordering reflects user intent rather than network
/// completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Durable id once confirmed; client-generated temp id before that.
    pub id: String,
    /// Chat this message belongs to.
    pub chat_id: String,
    /// Author role.
    pub role: Role,
    /// Message body.
    pub content: String,
    /// Payload kind.
    pub kind: ContentKind,
    /// Delivery status.
    pub status: DeliveryStatus,
    /// Monotonic per-chat ordering key.
    pub sequence: u64,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// True while this entry awaits backend confirmation.
    pub is_optimistic: bool,
    /// Last failure reason, if the most recent send failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True once the content has been edited after creation.
    #[serde(default)]
    pub was_edited: bool,
}

impl Message {
    /// Build an optimistic placeholder for a message the user just sent.
    pub fn placeholder(
        temp_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
        kind: ContentKind,
        sequence: u64,
        now_ms: u64,
    ) -> Self {
        Self {
            id: temp_id.into(),
            chat_id: chat_id.into(),
            role: Role::User,
            content: content.into(),
            kind,
            status: DeliveryStatus::Sending,
            sequence,
            created_at_ms: now_ms,
            is_optimistic: true,
            error: None,
            was_edited: false,
        }
    }
}
