//! Message state reducer: the single owner of the canonical message list.
//!
//! All mutation goes through [`MessageLog::apply`] with a [`MessageAction`];
//! everything else only reads. Send and receive paths converge on the same
//! reducer so they cannot diverge on message identity. Actions are applied
//! strictly in dispatch order.
//!
//! Illegal delivery-status transitions are rejected centrally here and
//! logged, never silently applied and never surfaced as user-facing errors
//! (they indicate a race, not a failure).

use crate::models::{DeliveryStatus, Message};
use std::collections::HashSet;

/// Domain transition over the message list.
#[derive(Debug, Clone)]
pub enum MessageAction {
    /// Replace the canonical list with a merge of the server list and any
    /// still-pending optimistic entries (pending entries not yet confirmed
    /// are preserved even if absent from the server list).
    SetMessages(Vec<Message>),
    /// Append a message; optimistic entries join the pending set.
    AddMessage(Message),
    /// Replace the placeholder at `temp_id` in place with its confirmed
    /// counterpart, preserving the placeholder's slot and sequence.
    ConfirmMessage {
        /// Temp id of the optimistic placeholder.
        temp_id: String,
        /// Confirmed message built from the server record.
        confirmed: Message,
    },
    /// Update a message's delivery status if the transition is legal.
    UpdateStatus {
        /// Target message id.
        id: String,
        /// Requested status.
        status: DeliveryStatus,
    },
    /// Mark a send as failed: the message stays in the list with
    /// `status = Failed` and the error recorded, and leaves the pending set
    /// so a retry affordance can be offered.
    HandleFailure {
        /// Target message id.
        id: String,
        /// Failure reason.
        error: String,
    },
    /// Put a failed message back on the wire: status returns to `Sending`,
    /// the error clears.
    RetryMessage {
        /// Target message id.
        id: String,
    },
    /// Begin editing a message.
    StartEdit {
        /// Target message id.
        id: String,
    },
    /// Apply new content to the message being edited.
    SaveEdit {
        /// Replacement content.
        content: String,
    },
    /// Abandon the in-progress edit.
    CancelEdit,
    /// Reset to the empty initial state.
    ClearMessages,
}

/// Canonical per-chat message state.
///
/// Owns the ordered message list, the pending (unconfirmed optimistic) set,
/// and the single in-progress edit. `is_processing` is derived: true while
/// any optimistic entry awaits confirmation.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    pending: HashSet<String>,
    editing_id: Option<String>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one action. The only mutation entry point.
    pub fn apply(&mut self, action: MessageAction) {
        match action {
            MessageAction::SetMessages(server_list) => self.set_messages(server_list),
            MessageAction::AddMessage(msg) => self.add_message(msg),
            MessageAction::ConfirmMessage { temp_id, confirmed } => {
                self.confirm_message(&temp_id, confirmed)
            }
            MessageAction::UpdateStatus { id, status } => self.update_status(&id, status),
            MessageAction::HandleFailure { id, error } => self.handle_failure(&id, error),
            MessageAction::RetryMessage { id } => self.retry_message(&id),
            MessageAction::StartEdit { id } => self.start_edit(&id),
            MessageAction::SaveEdit { content } => self.save_edit(content),
            MessageAction::CancelEdit => self.editing_id = None,
            MessageAction::ClearMessages => {
                self.messages.clear();
                self.pending.clear();
                self.editing_id = None;
            }
        }
    }

    fn set_messages(&mut self, server_list: Vec<Message>) {
        let server_ids: HashSet<&str> = server_list.iter().map(|m| m.id.as_str()).collect();
        let preserved: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| self.pending.contains(&m.id) && !server_ids.contains(m.id.as_str()))
            .cloned()
            .collect();

        self.messages = server_list;
        self.messages.extend(preserved);
        // Pending entries confirmed out-of-band are no longer pending.
        let live_ids: HashSet<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();
        self.pending.retain(|id| live_ids.contains(id.as_str()));
    }

    fn add_message(&mut self, msg: Message) {
        if self.messages.iter().any(|m| m.id == msg.id) {
            log::warn!("Rejected duplicate ADD_MESSAGE for id {}", msg.id);
            return;
        }
        if msg.is_optimistic {
            self.pending.insert(msg.id.clone());
        }
        self.messages.push(msg);
    }

    fn confirm_message(&mut self, temp_id: &str, mut confirmed: Message) {
        match self.messages.iter_mut().find(|m| m.id == temp_id) {
            Some(slot) => {
                // The placeholder's creation-time sequence is canonical;
                // ordering must reflect user intent, not confirm order.
                confirmed.sequence = slot.sequence;
                *slot = confirmed;
                self.pending.remove(temp_id);
            }
            None => {
                log::warn!(
                    "Rejected CONFIRM_MESSAGE for unknown temp id {} (already confirmed?)",
                    temp_id
                );
            }
        }
    }

    fn update_status(&mut self, id: &str, status: DeliveryStatus) {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
            log::warn!("Rejected UPDATE_MESSAGE_STATUS for unknown id {}", id);
            return;
        };
        if !msg.status.can_transition_to(status) {
            log::warn!(
                "Rejected illegal status transition {} -> {} for message {}",
                msg.status,
                status,
                id
            );
            return;
        }
        msg.status = status;
        if status == DeliveryStatus::Delivered {
            msg.error = None;
        }
    }

    fn handle_failure(&mut self, id: &str, error: String) {
        self.pending.remove(id);
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
            log::warn!("Rejected HANDLE_MESSAGE_FAILURE for unknown id {}", id);
            return;
        };
        if msg.status != DeliveryStatus::Failed {
            if !msg.status.can_transition_to(DeliveryStatus::Failed) {
                log::warn!(
                    "Rejected illegal failure transition {} -> failed for message {}",
                    msg.status,
                    id
                );
                return;
            }
            msg.status = DeliveryStatus::Failed;
        }
        msg.error = Some(error);
    }

    fn retry_message(&mut self, id: &str) {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
            log::warn!("Rejected RETRY_MESSAGE for unknown id {}", id);
            return;
        };
        if !msg.status.can_transition_to(DeliveryStatus::Sending) {
            log::warn!(
                "Rejected RETRY_MESSAGE for message {} in status {}",
                id,
                msg.status
            );
            return;
        }
        msg.status = DeliveryStatus::Sending;
        msg.error = None;
        if msg.is_optimistic {
            self.pending.insert(msg.id.clone());
        }
    }

    fn start_edit(&mut self, id: &str) {
        if self.messages.iter().any(|m| m.id == id) {
            self.editing_id = Some(id.to_string());
        } else {
            log::warn!("Rejected START_MESSAGE_EDIT for unknown id {}", id);
        }
    }

    fn save_edit(&mut self, content: String) {
        let Some(id) = self.editing_id.take() else {
            log::warn!("Rejected SAVE_MESSAGE_EDIT with no edit in progress");
            return;
        };
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) {
            msg.content = content;
            msg.was_edited = true;
        }
    }

    /// The canonical, ordered message list.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Look up a message by id.
    pub fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Ids of optimistic entries still awaiting confirmation.
    pub fn pending_ids(&self) -> &HashSet<String> {
        &self.pending
    }

    /// True while any optimistic entry awaits confirmation.
    pub fn is_processing(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Id of the message currently being edited, if any.
    pub fn editing_id(&self) -> Option<&str> {
        self.editing_id.as_deref()
    }

    /// Sequence for the next message: assigned at creation time from the
    /// current length, never reassigned.
    pub fn next_sequence(&self) -> u64 {
        self.messages.len() as u64
    }
}
