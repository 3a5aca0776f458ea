//! Timeout configuration for pulse-link operations.
//!
//! Every remote call carries an explicit per-request timeout so a request
//! that never resolves cannot leave a message stuck in `sending` forever.

use std::time::Duration;

/// Per-operation timeout configuration.
///
/// # Examples
///
/// ```rust
/// use pulse_link::LinkTimeouts;
/// use std::time::Duration;
///
/// // Defaults are suitable for most deployments.
/// let timeouts = LinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments.
/// let timeouts = LinkTimeouts::builder()
///     .send_timeout(Duration::from_secs(30))
///     .load_timeout(Duration::from_secs(60))
///     .build();
///
/// // Aggressive timeouts for tests and local development.
/// let timeouts = LinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTimeouts {
    /// Timeout for a single message insert (the optimistic send's remote
    /// write). Default: 10 seconds.
    pub send_timeout: Duration,

    /// Timeout for loading a chat's message history.
    /// Default: 30 seconds.
    pub load_timeout: Duration,

    /// Timeout for opening a subscription channel.
    /// Default: 5 seconds.
    pub subscribe_timeout: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(10),
            load_timeout: Duration::from_secs(30),
            subscribe_timeout: Duration::from_secs(5),
        }
    }
}

impl LinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> LinkTimeoutsBuilder {
        LinkTimeoutsBuilder::new()
    }

    /// Timeouts optimized for fast local development and tests.
    pub fn fast() -> Self {
        Self {
            send_timeout: Duration::from_secs(2),
            load_timeout: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(2),
        }
    }
}

/// Builder for [`LinkTimeouts`].
#[derive(Debug, Clone)]
pub struct LinkTimeoutsBuilder {
    timeouts: LinkTimeouts,
}

impl LinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: LinkTimeouts::default(),
        }
    }

    /// Set the message send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    /// Set the history load timeout.
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.load_timeout = timeout;
        self
    }

    /// Set the channel open timeout.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.subscribe_timeout = timeout;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> LinkTimeouts {
        self.timeouts
    }
}
