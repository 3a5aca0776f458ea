//! Reconnection behavior options.

use serde::{Deserialize, Serialize};

/// Options controlling automatic reconnection after a dropped channel.
///
/// Separate from [`LinkTimeouts`](crate::LinkTimeouts), which bounds
/// individual requests: these options shape the retry schedule between
/// attempts.
///
/// # Example
///
/// ```rust
/// use pulse_link::ReconnectOptions;
///
/// let options = ReconnectOptions::default()
///     .with_initial_delay_ms(500)
///     .with_max_delay_ms(10_000)
///     .with_max_attempts(3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectOptions {
    /// Enable automatic reconnection on channel loss.
    /// Default: true.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Initial delay between reconnection attempts, in milliseconds.
    /// Doubles on each failure up to `max_delay_ms`. Default: 1000.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Ceiling for the exponential backoff delay, in milliseconds.
    /// Default: 30000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Reconnection attempts before giving up and surfacing a terminal
    /// failure. Default: 5.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Add up to 10% deterministic jitter to each delay so concurrent
    /// channels do not reconnect in lockstep. Default: true.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_jitter() -> bool {
    true
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 5,
            jitter: true,
        }
    }
}

impl ReconnectOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to reconnect automatically on channel loss.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the initial delay between reconnection attempts (milliseconds).
    pub fn with_initial_delay_ms(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    /// Set the maximum backoff delay (milliseconds).
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Set the number of attempts before giving up.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ReconnectOptions::default();
        assert!(options.auto_reconnect);
        assert_eq!(options.initial_delay_ms, 1000);
        assert_eq!(options.max_delay_ms, 30_000);
        assert_eq!(options.max_attempts, 5);
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let options: ReconnectOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ReconnectOptions::default());
    }
}
