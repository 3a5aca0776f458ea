//! Subscription channel identity and transport-level events.

use super::change_event::ChangeEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a logical subscription: a table plus a filter expression.
///
/// At most one channel is active per key at any time; subscribing again with
/// an existing key tears down the prior channel first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    /// Backend table name (e.g. `"messages"`).
    pub table: String,
    /// Filter expression scoping the channel (e.g. `"chat_id=eq.chat_42"`).
    pub filter: String,
}

impl ChannelKey {
    /// Create a channel key.
    pub fn new(table: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: filter.into(),
        }
    }

    /// Key for a chat's message stream.
    pub fn messages(chat_id: &str) -> Self {
        Self::new("messages", format!("chat_id=eq.{}", chat_id))
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.filter)
    }
}

/// Status reported by the underlying transport for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The channel is live and delivering events.
    Subscribed,
    /// The channel failed with the given reason.
    ChannelError(String),
    /// The channel was closed by the transport.
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Subscribed => write!(f, "subscribed"),
            ChannelStatus::ChannelError(reason) => write!(f, "channel error: {}", reason),
            ChannelStatus::Closed => write!(f, "closed"),
        }
    }
}

/// An event delivered by the transport on an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Channel lifecycle status change.
    Status(ChannelStatus),
    /// A row-level change.
    Change(ChangeEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_and_display() {
        let a = ChannelKey::messages("chat_1");
        let b = ChannelKey::new("messages", "chat_id=eq.chat_1");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "messages:chat_id=eq.chat_1");
    }

    #[test]
    fn test_distinct_filters_are_distinct_keys() {
        assert_ne!(ChannelKey::messages("chat_1"), ChannelKey::messages("chat_2"));
    }
}
