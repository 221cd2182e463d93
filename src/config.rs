//! Node configuration.
//!
//! The core consumes a plain configuration struct; loading it from files or
//! command lines is left to callers.

use std::net::SocketAddr;
use std::time::Duration;

use crate::core::{
    DEFAULT_EVENT_BUFFER, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY,
};

/// Bounded retry policy for dialing peers.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum connect attempts before giving up.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Configuration for a meshwire node (any role).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the accepting role binds to.
    pub bind_addr: SocketAddr,
    /// Heartbeat sweep interval.
    pub heartbeat_interval: Duration,
    /// How long to wait for the peer's key exchange message.
    pub handshake_timeout: Duration,
    /// Dial retry policy.
    pub retry: RetryPolicy,
    /// Bound for event channels.
    pub event_buffer: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7400"
                .parse()
                .expect("default bind address is valid"),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            retry: RetryPolicy::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl NodeConfig {
    /// Start building a configuration.
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::new()
    }
}

/// Builder for [`NodeConfig`].
#[derive(Debug, Default)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    /// Create a builder with default values.
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
        }
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the dial retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the event channel bound.
    pub fn event_buffer(mut self, buffer: usize) -> Self {
        self.config.event_buffer = buffer;
        self
    }

    /// Finish building.
    pub fn build(self) -> NodeConfig {
        self.config
    }
}
