//! Send-transaction bookkeeping.
//!
//! A [`SendTransaction`] shadows each optimistic send with an append-only
//! log of state transitions, giving diagnostics a precise timeline of what
//! happened to a message and when.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a send transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    /// Transaction created; placeholder not yet dispatched.
    Initiated,
    /// Placeholder dispatched to the reducer; remote write not yet started.
    Pending,
    /// Remote write in flight.
    Processing,
    /// Remote write confirmed.
    Confirmed,
    /// Remote write failed.
    Failed,
    /// A retry of a failed write is in flight.
    Retrying,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Initiated => write!(f, "initiated"),
            TransactionState::Pending => write!(f, "pending"),
            TransactionState::Processing => write!(f, "processing"),
            TransactionState::Confirmed => write!(f, "confirmed"),
            TransactionState::Failed => write!(f, "failed"),
            TransactionState::Retrying => write!(f, "retrying"),
        }
    }
}

/// Bookkeeping wrapper around one optimistic send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTransaction {
    /// Id of the message this transaction tracks (temp id until confirmed).
    pub message_id: String,
    /// Current state.
    pub state: TransactionState,
    /// Number of retries performed.
    pub retry_count: u32,
    /// Ordered transition log: (state, at_ms).
    pub transitions: Vec<(TransactionState, u64)>,
}

impl SendTransaction {
    /// Start a transaction for a message at `now_ms`.
    pub fn begin(message_id: impl Into<String>, now_ms: u64) -> Self {
        Self {
            message_id: message_id.into(),
            state: TransactionState::Initiated,
            retry_count: 0,
            transitions: vec![(TransactionState::Initiated, now_ms)],
        }
    }

    /// Append a transition to `state` at `now_ms`.
    ///
    /// Entering `Retrying` increments the retry counter.
    pub fn advance(&mut self, state: TransactionState, now_ms: u64) {
        if state == TransactionState::Retrying {
            self.retry_count += 1;
        }
        self.state = state;
        self.transitions.push((state, now_ms));
    }

    /// Whether the transaction reached a settled state.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Confirmed | TransactionState::Failed
        )
    }
}
