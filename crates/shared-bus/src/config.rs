//! Bus configuration with validation.

use crate::domain::{MatchMode, WILDCARD};
use crate::forwarder::ForwardTimeoutPolicy;
use serde::{Deserialize, Serialize};
use shared_types::Priority;
use std::time::Duration;

/// Message bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Requester identity stamped on outgoing requests.
    pub identity: String,
    /// Namespace prefix for [`crate::MessageBus::subscribe`] and
    /// [`crate::MessageBus::prefixed`].
    pub prefix: String,
    /// Timeout budget given to a request when the sender sets none.
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Wait used by receives when the caller sets none.
    #[serde(with = "humantime_serde")]
    pub recv_timeout: Duration,
    /// Priority given to a request when the sender sets none.
    pub default_priority: i8,
    /// Wildcard matching mode.
    pub match_mode: MatchMode,
    /// Timeout budget handling across forwarding hops.
    pub forward_timeout: ForwardTimeoutPolicy,
    /// Transaction id generations tried before reporting a collision.
    pub max_id_attempts: u32,
    /// Unclaimed results older than this are swept. `None` keeps them.
    #[serde(with = "humantime_serde")]
    pub result_retention: Option<Duration>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            identity: "bus".to_string(),
            prefix: "/".to_string(),
            default_timeout: Duration::from_secs(5),
            recv_timeout: Duration::from_secs(5),
            default_priority: Priority::NORMAL.0,
            match_mode: MatchMode::Glob,
            forward_timeout: ForwardTimeoutPolicy::DecrementElapsed,
            max_id_attempts: 3,
            result_retention: None,
        }
    }
}

impl BusConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// - `ConfigError::Invalid` for an empty identity or a zero
    ///   `max_id_attempts`.
    /// - `ConfigError::InvalidPrefix` when the prefix contains a wildcard.
    /// - `ConfigError::InvalidTimeout` for a zero default timeout, receive
    ///   timeout or result retention.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.is_empty() {
            return Err(ConfigError::Invalid("identity cannot be empty".into()));
        }

        if self.prefix.contains(WILDCARD) {
            return Err(ConfigError::InvalidPrefix(self.prefix.clone()));
        }

        if self.default_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default_timeout cannot be 0".into(),
            ));
        }

        if self.recv_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("recv_timeout cannot be 0".into()));
        }

        if self.result_retention.is_some_and(|retention| retention.is_zero()) {
            return Err(ConfigError::InvalidTimeout(
                "result_retention cannot be 0".into(),
            ));
        }

        if self.max_id_attempts == 0 {
            return Err(ConfigError::Invalid("max_id_attempts cannot be 0".into()));
        }

        Ok(())
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    #[must_use]
    pub fn with_forward_timeout(mut self, policy: ForwardTimeoutPolicy) -> Self {
        self.forward_timeout = policy;
        self
    }

    #[must_use]
    pub fn with_result_retention(mut self, retention: Duration) -> Self {
        self.result_retention = Some(retention);
        self
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Prefix would be read as a wildcard pattern
    #[error("invalid prefix {0:?}: must not contain a wildcard")]
    InvalidPrefix(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
