//! Data models for the pulse-link sync core.
//!
//! Defines the message model with its delivery-status state machine, the
//! records exchanged with the backend, subscription channel identities and
//! events, and reconnection options.

pub mod change_event;
pub mod channel;
pub mod message;
pub mod reconnect_options;
pub mod record;

pub use change_event::ChangeEvent;
pub use channel::{ChannelEvent, ChannelKey, ChannelStatus};
pub use message::{ContentKind, DeliveryStatus, Message, Role};
pub use reconnect_options::ReconnectOptions;
pub use record::{MessageDraft, MessageRecord};
