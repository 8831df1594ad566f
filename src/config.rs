//! Pool configuration for database devices.
//!
//! Every option is optional; the `*_or_default` accessors supply the defaults below.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LIVENESS_TIMEOUT_MS: u64 = 2000;

/// Behavior of `Device::connection` when the connection limit is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireMode {
    /// Wait up to the acquire timeout for a connection to be freed
    #[default]
    Wait,
    /// Fail immediately with `PoolExhausted`
    FailFast,
}

impl std::fmt::Display for AcquireMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wait => write!(f, "wait"),
            Self::FailFast => write!(f, "fail_fast"),
        }
    }
}

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Maximum live connections per device, idle ones included (default: 10)
    pub max_connections: Option<u32>,
    /// What to do when the limit is reached (default: wait)
    pub acquire_mode: Option<AcquireMode>,
    /// How long `Wait` mode waits for a free slot in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Connect/handshake timeout in seconds (default: 10)
    pub connect_timeout_secs: Option<u64>,
    /// Upper bound of a liveness probe in milliseconds (default: 2000)
    pub liveness_timeout_ms: Option<u64>,
}

impl PoolOptions {
    /// Get max_connections with default value.
    pub fn max_connections_or_default(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    /// Get acquire_mode with default value.
    pub fn acquire_mode_or_default(&self) -> AcquireMode {
        self.acquire_mode.unwrap_or_default()
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    /// Get connect_timeout with default value.
    pub fn connect_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Get liveness_timeout with default value.
    pub fn liveness_timeout_or_default(&self) -> Duration {
        Duration::from_millis(
            self.liveness_timeout_ms
                .unwrap_or(DEFAULT_LIVENESS_TIMEOUT_MS),
        )
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == Some(0) {
            return Err("max_connections must be greater than 0".to_string());
        }
        if self.connect_timeout_secs == Some(0) {
            return Err("connect_timeout_secs must be greater than 0".to_string());
        }
        if self.liveness_timeout_ms == Some(0) {
            return Err("liveness_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}
