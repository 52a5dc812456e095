//! Pool configuration

use std::env;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PoolError, Result};

/// Default number of executor threads
pub const DEFAULT_THREAD_COUNT: usize = 2;

/// Default buffer size for passive event listeners
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Executor pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool ID used in logs (generated if not provided)
    pub pool_id: String,

    /// Number of executor threads created at initialization
    pub thread_count: usize,

    /// Executor threads are named `<prefix>-<slot>`
    pub thread_name_prefix: String,

    /// Buffered events per passive listener before it starts lagging
    pub event_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_id: format!("pool-{}", Uuid::now_v7()),
            thread_count: DEFAULT_THREAD_COUNT,
            thread_name_prefix: "rotor-worker".to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given number of threads
    pub fn new(thread_count: usize) -> Self {
        Self::default().with_thread_count(thread_count)
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `ROTOR_POOL_ID`: Pool ID (default: generated)
    /// - `ROTOR_THREAD_COUNT`: Number of executor threads (default: 2)
    /// - `ROTOR_THREAD_NAME_PREFIX`: Thread name prefix (default: "rotor-worker")
    /// - `ROTOR_EVENT_CAPACITY`: Passive listener buffer (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let pool_id = env::var("ROTOR_POOL_ID")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.pool_id);

        let thread_count = env::var("ROTOR_THREAD_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.thread_count);

        let thread_name_prefix = env::var("ROTOR_THREAD_NAME_PREFIX")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.thread_name_prefix);

        let event_capacity = env::var("ROTOR_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.event_capacity);

        Self {
            pool_id,
            thread_count,
            thread_name_prefix,
            event_capacity,
        }
    }

    /// Set the pool ID
    pub fn with_pool_id(mut self, id: impl Into<String>) -> Self {
        self.pool_id = id.into();
        self
    }

    /// Set the number of executor threads
    pub fn with_thread_count(mut self, count: usize) -> Self {
        self.thread_count = count.max(1);
        self
    }

    /// Set the executor thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the passive listener buffer size
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(PoolError::InvalidConfig(
                "thread_count must be at least 1".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "event_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Name of the executor thread for a slot
    pub(crate) fn thread_name(&self, slot: usize) -> String {
        format!("{}-{}", self.thread_name_prefix, slot)
    }
}
