//! Exponential backoff policy for reconnection attempts.
//!
//! Computes retry delays from an attempt counter without scheduling any
//! timers itself. The caller is responsible for sleeping the returned
//! duration, which keeps the policy pure and directly testable.

use crate::models::ReconnectOptions;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Retry-delay policy: `min(initial * 2^attempt, max)` with optional jitter.
///
/// Once the attempt counter reaches `max_attempts`, [`next_delay`]
/// returns `None`, signalling the caller to stop retrying and surface a
/// terminal connection error. [`reset`] must be called on every successful
/// connection so later outages start from the initial delay again.
///
/// [`next_delay`]: BackoffPolicy::next_delay
/// [`reset`]: BackoffPolicy::reset
///
/// # Examples
///
/// ```rust
/// use pulse_link::BackoffPolicy;
/// use std::time::Duration;
///
/// let mut backoff = BackoffPolicy::new().with_jitter(false);
/// assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1000)));
/// assert_eq!(backoff.next_delay(), Some(Duration::from_millis(2000)));
/// backoff.reset();
/// assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1000)));
/// ```
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    jitter: bool,
    seed: String,
    attempt: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffPolicy {
    /// Default initial delay between attempts (1 second).
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
    /// Default delay ceiling (30 seconds).
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
    /// Default attempt ceiling before giving up.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    /// Jitter bound as a fraction of the base delay (10%).
    const JITTER_DIVISOR: u64 = 10;

    /// Create a policy with the default delays and attempt ceiling.
    pub fn new() -> Self {
        Self {
            initial_delay: Self::DEFAULT_INITIAL_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            jitter: true,
            seed: "backoff".to_string(),
            attempt: 0,
        }
    }

    /// Set the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay ceiling.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the attempt ceiling.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the jitter seed. Policies with distinct seeds (one per channel)
    /// spread their reconnect attempts instead of thundering together.
    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = seed.into();
        self
    }

    /// Compute the delay for a given attempt index without touching the
    /// internal counter. Returns `None` once the index reaches the ceiling.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let initial_ms = self.initial_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let base_ms = initial_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(max_ms);

        let delay_ms = if self.jitter {
            // Deterministic jitter derived from (seed, attempt): stable for
            // a given policy so tests are reproducible, while different
            // channels land on different offsets. Capped so jitter never
            // exceeds the configured ceiling.
            let span = (base_ms / Self::JITTER_DIVISOR).max(1);
            let mut hasher = DefaultHasher::new();
            self.seed.hash(&mut hasher);
            attempt.hash(&mut hasher);
            let offset = hasher.finish() % (span + 1);
            base_ms.saturating_add(offset).min(max_ms)
        } else {
            base_ms
        };

        Some(Duration::from_millis(delay_ms))
    }

    /// Delay before the next attempt, or `None` when attempts are exhausted.
    ///
    /// Advances the internal attempt counter on every non-`None` return.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.delay_for_attempt(self.attempt)?;
        self.attempt += 1;
        Some(delay)
    }

    /// Zero the attempt counter. Call on every successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts consumed since the last [`reset`](BackoffPolicy::reset).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Configured attempt ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the attempt ceiling has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

impl From<&ReconnectOptions> for BackoffPolicy {
    fn from(options: &ReconnectOptions) -> Self {
        BackoffPolicy::new()
            .with_initial_delay(Duration::from_millis(options.initial_delay_ms))
            .with_max_delay(Duration::from_millis(options.max_delay_ms))
            .with_max_attempts(options.max_attempts)
            .with_jitter(options.jitter)
    }
}
