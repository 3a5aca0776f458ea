//! Circuit breaker gating reconnection attempts.
//!
//! Answers "may I try to connect at all" while [`BackoffPolicy`] answers
//! "how long should I wait" — the two are deliberately decoupled. Repeated
//! failures trip the breaker open so a degraded backend is not hammered by
//! a storm of reconnect attempts.
//!
//! [`BackoffPolicy`]: crate::BackoffPolicy
//!
//! Time is injected as milliseconds since the Unix epoch rather than read
//! internally, so state transitions are deterministic under test.

use std::fmt;
use std::time::Duration;

/// Breaker state: `Closed -> Open -> HalfOpen -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; attempts are always allowed.
    Closed,
    /// Tripped; attempts are blocked until the reset timeout elapses.
    Open,
    /// Probing; one attempt was released, further attempts wait out the
    /// half-open grace period until a success closes the breaker.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Consecutive-failure circuit breaker for connection attempts.
///
/// # Examples
///
/// ```rust
/// use pulse_link::{CircuitBreaker, CircuitState};
///
/// let mut breaker = CircuitBreaker::new();
/// let now = 1_000_000;
/// for _ in 0..5 {
///     breaker.record_failure(now);
/// }
/// assert_eq!(breaker.state(), CircuitState::Open);
/// assert!(!breaker.can_attempt(now + 1_000));
/// // After the reset timeout the breaker releases exactly one probe.
/// assert!(breaker.can_attempt(now + 60_001));
/// assert_eq!(breaker.state(), CircuitState::HalfOpen);
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_timeout: Duration,
    last_failure_ms: Option<u64>,
    half_open_since_ms: Option<u64>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    /// Failures before the breaker trips open.
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    /// Cool-down before an open breaker releases a probe attempt (60 s).
    pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);
    /// Grace period between half-open probe attempts (30 s).
    pub const DEFAULT_HALF_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a breaker with the default thresholds and timeouts.
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold: Self::DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: Self::DEFAULT_RESET_TIMEOUT,
            half_open_timeout: Self::DEFAULT_HALF_OPEN_TIMEOUT,
            last_failure_ms: None,
            half_open_since_ms: None,
        }
    }

    /// Set the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the open-state cool-down.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set the half-open grace period.
    pub fn with_half_open_timeout(mut self, timeout: Duration) -> Self {
        self.half_open_timeout = timeout;
        self
    }

    /// Record a failed connection attempt at `now_ms`.
    ///
    /// Trips the breaker open once the failure count reaches the threshold.
    /// A failure while half-open re-opens the breaker immediately.
    pub fn record_failure(&mut self, now_ms: u64) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_ms = Some(now_ms);
        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= self.failure_threshold {
                    log::warn!(
                        "Circuit breaker open after {} consecutive failures",
                        self.failure_count
                    );
                    self.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                log::warn!("Probe attempt failed; circuit breaker re-opened");
                self.state = CircuitState::Open;
                self.half_open_since_ms = None;
            }
            CircuitState::Open => {}
        }
    }

    /// Record a successful connection.
    ///
    /// In half-open state this closes the breaker and clears all counters.
    /// In closed state it is a no-op; the failure count only clears through
    /// the half-open path.
    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            log::info!("Probe attempt succeeded; circuit breaker closed");
            self.state = CircuitState::Closed;
            self.failure_count = 0;
            self.last_failure_ms = None;
            self.half_open_since_ms = None;
        }
    }

    /// Whether a connection attempt is allowed at `now_ms`.
    ///
    /// - Closed: always `true`.
    /// - Open: `true` only once the reset timeout has elapsed since the last
    ///   failure; that check itself transitions the breaker to half-open, so
    ///   exactly one caller gets the probe.
    /// - HalfOpen: `true` only after the additional half-open grace period.
    pub fn can_attempt(&mut self, now_ms: u64) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self
                    .last_failure_ms
                    .map(|at| now_ms.saturating_sub(at))
                    .unwrap_or(u64::MAX);
                if elapsed >= self.reset_timeout.as_millis() as u64 {
                    log::debug!("Circuit breaker half-open after {}ms cool-down", elapsed);
                    self.state = CircuitState::HalfOpen;
                    self.half_open_since_ms = Some(now_ms);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                let since = self.half_open_since_ms.unwrap_or(now_ms);
                now_ms.saturating_sub(since) >= self.half_open_timeout.as_millis() as u64
            }
        }
    }

    /// Current breaker state.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consecutive failures recorded since the breaker last closed.
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Reset to the initial closed state, clearing all counters.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.last_failure_ms = None;
        self.half_open_since_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn tripped_breaker() -> CircuitBreaker {
        let mut breaker = CircuitBreaker::new();
        for _ in 0..CircuitBreaker::DEFAULT_FAILURE_THRESHOLD {
            breaker.record_failure(T0);
        }
        breaker
    }

    #[test]
    fn test_closed_always_allows() {
        let mut breaker = CircuitBreaker::new();
        assert!(breaker.can_attempt(T0));
        breaker.record_failure(T0);
        assert!(breaker.can_attempt(T0 + 1));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_trips_open_at_threshold() {
        let breaker = tripped_breaker();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 5);
    }

    #[test]
    fn test_open_blocks_until_reset_timeout() {
        let mut breaker = tripped_breaker();
        assert!(!breaker.can_attempt(T0 + 59_999));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_reopen_releases_exactly_one_probe() {
        let mut breaker = tripped_breaker();
        let after_cooldown = T0 + 60_000;
        assert!(breaker.can_attempt(after_cooldown), "first check releases the probe");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(
            !breaker.can_attempt(after_cooldown + 1),
            "second check must wait out the half-open grace period"
        );
    }

    #[test]
    fn test_half_open_allows_after_grace_period() {
        let mut breaker = tripped_breaker();
        let after_cooldown = T0 + 60_000;
        assert!(breaker.can_attempt(after_cooldown));
        assert!(breaker.can_attempt(after_cooldown + 30_000));
    }

    #[test]
    fn test_success_in_half_open_closes() {
        let mut breaker = tripped_breaker();
        assert!(breaker.can_attempt(T0 + 60_000));
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.can_attempt(T0 + 60_001));
    }

    #[test]
    fn test_success_in_closed_is_noop() {
        let mut breaker = CircuitBreaker::new();
        breaker.record_failure(T0);
        breaker.record_failure(T0);
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 2, "closed-state success must not clear counters");
    }

    #[test]
    fn test_failure_in_half_open_reopens() {
        let mut breaker = tripped_breaker();
        assert!(breaker.can_attempt(T0 + 60_000));
        breaker.record_failure(T0 + 60_500);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_attempt(T0 + 61_000));
        // A fresh cool-down starts from the half-open failure.
        assert!(breaker.can_attempt(T0 + 60_500 + 60_000));
    }
}
