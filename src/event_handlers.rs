//! Connection lifecycle event handlers.
//!
//! Callback-based hooks for monitoring the realtime connection:
//!
//! - [`on_connect`](EventHandlers::on_connect): fired when the connection is established
//! - [`on_disconnect`](EventHandlers::on_disconnect): fired when the connection drops
//! - [`on_error`](EventHandlers::on_error): fired on connection or channel errors
//! - [`on_notice`](EventHandlers::on_notice): fired for every user-visible
//!   connection notification (the toast layer subscribes here)
//!
//! # Example
//!
//! ```rust
//! use pulse_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("Connected"))
//!     .on_disconnect(|reason| println!("Disconnected: {}", reason))
//!     .on_notice(|notice| println!("{}", notice));
//! ```

use std::fmt;
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection dropped.
    pub message: String,
}

impl DisconnectReason {
    /// Create a new disconnect reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether auto-reconnect may still succeed.
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// User-visible connection notification.
///
/// Every committed connection status change produces exactly one notice; the
/// `Display` impl is the canonical message text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Transitioned into connected from a non-connected status.
    ConnectionRestored,
    /// Disconnected with attempts remaining; a retry is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Configured attempt ceiling.
        max_attempts: u32,
    },
    /// Reconnection attempts are exhausted; manual intervention required.
    ConnectionFailed,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::ConnectionRestored => write!(f, "Connection restored"),
            Notice::Reconnecting {
                attempt,
                max_attempts,
            } => write!(f, "Reconnecting... (Attempt {}/{})", attempt, max_attempts),
            Notice::ConnectionFailed => write!(f, "Connection failed - please refresh"),
        }
    }
}

/// Type alias for the on_connect callback.
pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Type alias for the on_notice callback.
pub type OnNoticeCallback = Arc<dyn Fn(Notice) + Send + Sync>;

/// Connection lifecycle event handlers.
///
/// All handlers are optional; register only what you need. Handlers are
/// `Send + Sync` so they can be invoked from background tasks.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_notice: Option<OnNoticeCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_notice", &self.on_notice.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create empty handlers (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when the connection is established.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the connection drops.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked on connection or channel errors.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every user-visible connection
    /// notification. This is where a UI layer hangs its toast messages.
    pub fn on_notice(mut self, f: impl Fn(Notice) + Send + Sync + 'static) -> Self {
        self.on_notice = Some(Arc::new(f));
        self
    }

    /// Dispatch the on_connect event.
    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    /// Dispatch the on_disconnect event.
    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    /// Dispatch the on_error event.
    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    /// Dispatch the on_notice event.
    pub(crate) fn emit_notice(&self, notice: Notice) {
        if let Some(cb) = &self.on_notice {
            cb(notice);
        }
    }
}
