//! Connection state store: debounced status transitions, reconnect
//! scheduling, and user-visible notices.
//!
//! The store composes a [`BackoffPolicy`] (how long to wait) with a
//! [`CircuitBreaker`] (whether to try at all) and owns the single committed
//! [`ConnectionState`] the rest of the crate reads. Status changes pass
//! through a 300ms debounce window so a sub-second blip never reaches the
//! user; a transition into `Connected` is exempt and commits immediately.
//!
//! Time is injected as milliseconds since the Unix epoch. The store never
//! sleeps; callers commit due transitions by polling with the current time,
//! which keeps every path deterministic under test.

use crate::backoff::BackoffPolicy;
use crate::circuit::CircuitBreaker;
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers, Notice};
use crate::models::ReconnectOptions;
use std::fmt;
use std::time::Duration;

/// Default debounce window for non-`Connected` status transitions.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Connection status as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Establishing or re-establishing the connection.
    Connecting,
    /// Live connection.
    Connected,
    /// No connection; no attempt currently in flight.
    #[default]
    Disconnected,
    /// Terminal failure; reconnection attempts are exhausted.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// Committed connection state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    /// Current status.
    pub status: ConnectionStatus,
    /// Reconnect attempts consumed since the last successful connection.
    pub retry_count: u32,
    /// Timestamp of the last connect attempt or failure, in epoch ms.
    pub last_attempt_ms: Option<u64>,
    /// Last error message, if the connection is degraded.
    pub error: Option<String>,
}

/// Outcome of [`ConnectionStateStore::handle_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// A retry is scheduled; the caller should sleep this long, check
    /// [`ConnectionStateStore::can_attempt`], and reconnect.
    RetryAfter(Duration),
    /// Attempts are exhausted; the caller must stop retrying.
    Exhausted,
}

struct PendingTransition {
    state: ConnectionState,
    notice: Option<Notice>,
    due_ms: u64,
}

/// Owner of the connection lifecycle state machine.
///
/// One store per client. All mutation funnels through
/// [`handle_success`](Self::handle_success),
/// [`handle_error`](Self::handle_error) and the time-based commit in
/// [`snapshot`](Self::snapshot).
pub struct ConnectionStateStore {
    committed: ConnectionState,
    pending: Option<PendingTransition>,
    backoff: BackoffPolicy,
    breaker: CircuitBreaker,
    handlers: EventHandlers,
    debounce_window: Duration,
}

impl Default for ConnectionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateStore {
    /// Create a store with default backoff, breaker and no handlers.
    pub fn new() -> Self {
        Self {
            committed: ConnectionState::default(),
            pending: None,
            backoff: BackoffPolicy::new(),
            breaker: CircuitBreaker::new(),
            handlers: EventHandlers::new(),
            debounce_window: DEBOUNCE_WINDOW,
        }
    }

    /// Create a store whose backoff follows the given reconnect options.
    ///
    /// With `auto_reconnect` disabled the first failure is terminal.
    pub fn from_options(options: &ReconnectOptions) -> Self {
        let mut backoff = BackoffPolicy::from(options);
        if !options.auto_reconnect {
            backoff = backoff.with_max_attempts(0);
        }
        Self {
            backoff,
            ..Self::new()
        }
    }

    /// Attach event handlers.
    pub fn with_handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Replace the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the circuit breaker.
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// Override the debounce window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// The configured debounce window.
    pub fn debounce_window(&self) -> Duration {
        self.debounce_window
    }

    /// Record a successful connection at `now_ms`.
    ///
    /// Resets the backoff counter, informs the breaker, and commits the
    /// `Connected` state immediately. Any pending degraded transition is
    /// discarded: a blip that resolves inside the debounce window is never
    /// shown to the user.
    pub fn handle_success(&mut self, now_ms: u64) {
        self.pending = None;
        self.backoff.reset();
        self.breaker.record_success();

        let was_connected = self.committed.status == ConnectionStatus::Connected;
        self.committed = ConnectionState {
            status: ConnectionStatus::Connected,
            retry_count: 0,
            last_attempt_ms: Some(now_ms),
            error: None,
        };
        if !was_connected {
            log::info!("Connection established");
            self.handlers.emit_connect();
            self.handlers.emit_notice(Notice::ConnectionRestored);
        }
    }

    /// Record a connection failure at `now_ms` and schedule recovery.
    ///
    /// Informs the breaker, consumes one backoff attempt, and stages a
    /// debounced status transition. The matching notice (`Reconnecting` or
    /// `ConnectionFailed`) is emitted when the transition commits, so it is
    /// suppressed along with the transition if a success lands first.
    pub fn handle_error(&mut self, now_ms: u64, error: impl Into<String>) -> Recovery {
        let error = error.into();
        self.breaker.record_failure(now_ms);

        if self.committed.status == ConnectionStatus::Connected {
            self.handlers
                .emit_disconnect(DisconnectReason::new(error.clone()));
        }

        match self.backoff.next_delay() {
            Some(delay) => {
                let attempt = self.backoff.attempt();
                log::warn!(
                    "Connection error (attempt {}/{}): {}; retrying in {:?}",
                    attempt,
                    self.backoff.max_attempts(),
                    error,
                    delay
                );
                self.handlers
                    .emit_error(ConnectionError::new(error.clone(), true));
                self.stage(
                    ConnectionState {
                        status: ConnectionStatus::Disconnected,
                        retry_count: attempt,
                        last_attempt_ms: Some(now_ms),
                        error: Some(error),
                    },
                    Some(Notice::Reconnecting {
                        attempt,
                        max_attempts: self.backoff.max_attempts(),
                    }),
                    now_ms,
                );
                Recovery::RetryAfter(delay)
            }
            None => {
                log::error!("Connection failed after {} attempts: {}", self.backoff.max_attempts(), error);
                self.handlers
                    .emit_error(ConnectionError::new(error.clone(), false));
                self.stage(
                    ConnectionState {
                        status: ConnectionStatus::Error,
                        retry_count: self.backoff.attempt(),
                        last_attempt_ms: Some(now_ms),
                        error: Some(error),
                    },
                    Some(Notice::ConnectionFailed),
                    now_ms,
                );
                Recovery::Exhausted
            }
        }
    }

    /// Note that a connection attempt is starting at `now_ms`.
    ///
    /// Stages a debounced transition to `Connecting`, but never displaces a
    /// pending transition (a scheduled reconnect notice outranks it). Only
    /// meaningful from `Disconnected`; an attempt that resolves inside the
    /// debounce window never surfaces as a status flicker.
    pub fn begin_connect(&mut self, now_ms: u64) {
        if self.pending.is_none() && self.committed.status == ConnectionStatus::Disconnected {
            let retry_count = self.backoff.attempt();
            self.stage(
                ConnectionState {
                    status: ConnectionStatus::Connecting,
                    retry_count,
                    last_attempt_ms: Some(now_ms),
                    error: self.committed.error.clone(),
                },
                None,
                now_ms,
            );
        }
    }

    // A new staged transition replaces any earlier pending one; the window
    // restarts from the latest event.
    fn stage(&mut self, state: ConnectionState, notice: Option<Notice>, now_ms: u64) {
        self.pending = Some(PendingTransition {
            state,
            notice,
            due_ms: now_ms + self.debounce_window.as_millis() as u64,
        });
    }

    /// Commit any due pending transition and return the committed state.
    pub fn snapshot(&mut self, now_ms: u64) -> ConnectionState {
        let due = self.pending.as_ref().is_some_and(|p| now_ms >= p.due_ms);
        if due {
            if let Some(pending) = self.pending.take() {
                log::debug!(
                    "Connection status {} -> {}",
                    self.committed.status,
                    pending.state.status
                );
                self.committed = pending.state;
                if let Some(notice) = pending.notice {
                    self.handlers.emit_notice(notice);
                }
            }
        }
        self.committed.clone()
    }

    /// The committed state, without advancing the debounce clock.
    pub fn state(&self) -> &ConnectionState {
        &self.committed
    }

    /// Whether the breaker allows a connection attempt at `now_ms`.
    pub fn can_attempt(&mut self, now_ms: u64) -> bool {
        self.breaker.can_attempt(now_ms)
    }

    /// Consecutive reconnect attempts consumed since the last success.
    pub fn retry_count(&self) -> u32 {
        self.backoff.attempt()
    }

    /// Whether reconnect attempts are exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.backoff.is_exhausted()
    }

    /// Return to the initial disconnected state, clearing backoff, breaker
    /// and any pending transition.
    pub fn reset(&mut self) {
        self.pending = None;
        self.backoff.reset();
        self.breaker.reset();
        self.committed = ConnectionState::default();
    }
}
