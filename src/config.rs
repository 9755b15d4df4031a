//! Configuration for the datasource layer
//!
//! Everything is an explicit struct constructed once at process start and
//! injected into the components that need it; nothing reads ambient
//! global state after construction. `from_env` covers the common case of
//! picking connection targets up from the process environment.

use crate::circuit_breaker::CircuitBreakerConfig;
use serde::Serialize;
use std::time::Duration;

/// How the connection target reaches the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Direct connection, preferred when configured.
    Unpooled,
    /// Connection through the provider's shared pooler.
    Pooled,
}

/// A resolved connection target.
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    pub url: String,
    pub mode: ConnectionMode,
}

/// Pick a connection target from the two optional configured values,
/// preferring the unpooled one. `None` means the deployment has no store
/// configured, which is a normal state (permanent fallback mode), not an
/// error.
pub fn resolve_target(
    unpooled: Option<String>,
    pooled: Option<String>,
) -> Option<ConnectionTarget> {
    let non_empty = |url: String, mode| {
        let url = url.trim().to_string();
        (!url.is_empty()).then_some(ConnectionTarget { url, mode })
    };

    unpooled
        .and_then(|url| non_empty(url, ConnectionMode::Unpooled))
        .or_else(|| pooled.and_then(|url| non_empty(url, ConnectionMode::Pooled)))
}

/// Tuning for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Attempts per connection-establishment cycle.
    pub max_connect_attempts: u32,
    /// Deadline for connecting and running the probe, per attempt.
    pub connect_timeout: Duration,
    /// Base delay between attempts; attempt N waits N times this.
    pub connect_backoff_base: Duration,
    /// Handles older than this are retired.
    pub max_age: Duration,
    /// Deadline for the periodic health probe.
    pub health_check_timeout: Duration,
    /// Cadence of the health-check loop.
    pub health_check_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: 3,
            connect_timeout: Duration::from_secs(10),
            connect_backoff_base: Duration::from_millis(250),
            max_age: Duration::from_secs(60 * 60), // 1 hour
            health_check_timeout: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(5 * 60), // 5 minutes
        }
    }
}

/// Tuning for the store accessor.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Deadline for the domain query.
    pub query_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
        }
    }
}

/// Bundled configuration for wiring the whole datasource at startup.
#[derive(Debug, Clone, Default)]
pub struct DatasourceConfig {
    pub target: Option<ConnectionTarget>,
    pub connection: ConnectionConfig,
    pub breaker: CircuitBreakerConfig,
    pub store: StoreConfig,
}

impl DatasourceConfig {
    /// Resolve the connection target from `DATABASE_URL_UNPOOLED` /
    /// `DATABASE_URL`, with defaults for everything else.
    pub fn from_env() -> Self {
        Self {
            target: resolve_target(
                std::env::var("DATABASE_URL_UNPOOLED").ok(),
                std::env::var("DATABASE_URL").ok(),
            ),
            ..Self::default()
        }
    }
}
