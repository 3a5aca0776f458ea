//! Change events delivered over a realtime subscription channel.

use super::record::MessageRecord;

/// A row-level change observed on a subscribed table.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A row was inserted.
    Insert {
        /// The inserted row.
        record: MessageRecord,
    },

    /// A row was updated.
    Update {
        /// The row's current values.
        record: MessageRecord,
    },

    /// A row was deleted.
    Delete {
        /// Id of the deleted row.
        id: String,
    },
}

impl ChangeEvent {
    /// The durable row id this event refers to.
    pub fn record_id(&self) -> &str {
        match self {
            Self::Insert { record } | Self::Update { record } => &record.id,
            Self::Delete { id } => id,
        }
    }
}
