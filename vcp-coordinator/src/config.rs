//! Configuration for the coordinator
//!
//! Deadlines and retry policy for control-point operations. Every field has
//! a default, so partial configurations deserialize cleanly.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoordinatorError, Result};

/// Configuration for the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Deadline for a host operation to be acknowledged by every target
    /// Default: 2 seconds
    pub operation_timeout: Duration,

    /// Bookkeeping deadline for autonomous updates without propagation
    /// Default: 500 milliseconds
    pub autonomous_timeout: Duration,

    /// Resubmissions allowed after an invalid change counter response
    /// Default: 1
    pub max_counter_retries: u8,

    /// Mirror an autonomous volume change of one group member onto the rest
    /// Default: true
    pub propagate_autonomous_group_changes: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(2),
            autonomous_timeout: Duration::from_millis(500),
            max_counter_retries: 1,
            propagate_autonomous_group_changes: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short deadlines for peers on a quiet link
    pub fn fast() -> Self {
        Self {
            operation_timeout: Duration::from_millis(750),
            autonomous_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    /// Generous deadlines and retries for congested links
    pub fn relaxed() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
            autonomous_timeout: Duration::from_secs(1),
            max_counter_retries: 3,
            ..Default::default()
        }
    }

    /// Apply overrides from the environment
    ///
    /// - `VCP_OPERATION_TIMEOUT_MS`
    /// - `VCP_AUTONOMOUS_TIMEOUT_MS`
    /// - `VCP_COUNTER_RETRIES`
    ///
    /// Unparseable values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| CoordinatorError::InvalidConfig(format!("{key}={value:?}")))
        }

        if let Some(value) = lookup("VCP_OPERATION_TIMEOUT_MS") {
            self.operation_timeout = Duration::from_millis(parse("VCP_OPERATION_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("VCP_AUTONOMOUS_TIMEOUT_MS") {
            self.autonomous_timeout =
                Duration::from_millis(parse("VCP_AUTONOMOUS_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("VCP_COUNTER_RETRIES") {
            self.max_counter_retries = parse("VCP_COUNTER_RETRIES", &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.operation_timeout.is_zero() {
            return Err(CoordinatorError::InvalidConfig(
                "Operation timeout must be greater than 0".to_string(),
            ));
        }

        if self.autonomous_timeout.is_zero() {
            return Err(CoordinatorError::InvalidConfig(
                "Autonomous timeout must be greater than 0".to_string(),
            ));
        }

        if self.autonomous_timeout > self.operation_timeout {
            return Err(CoordinatorError::InvalidConfig(
                "Autonomous timeout must not exceed the operation timeout".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_counter_retries(mut self, retries: u8) -> Self {
        self.max_counter_retries = retries;
        self
    }

    pub fn with_group_propagation(mut self, enabled: bool) -> Self {
        self.propagate_autonomous_group_changes = enabled;
        self
    }
}
