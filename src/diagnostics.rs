//! Diagnostics payload assembly
//!
//! Pulls the connection status and the metrics snapshot into one
//! serializable report with a coarse health rollup. Assembly only: how
//! the payload is transported (HTTP, log line, CLI) is the caller's
//! concern.

use crate::connection::{ConnectionManager, ConnectionStatus};
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitHealth {
    Closed,
    Open,
}

/// Coarse health verdicts derived from the raw status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthRollup {
    pub database: HealthState,
    pub circuit_breaker: CircuitHealth,
    pub overall: HealthState,
}

impl HealthRollup {
    fn from_status(status: &ConnectionStatus) -> Self {
        let database = if status.breaker.open {
            HealthState::Unhealthy
        } else if status.connected && status.healthy {
            HealthState::Healthy
        } else {
            // cold slot or downgraded handle: serving, but from fallback
            HealthState::Degraded
        };

        let circuit_breaker = if status.breaker.open {
            CircuitHealth::Open
        } else {
            CircuitHealth::Closed
        };

        let overall = match (database, circuit_breaker) {
            (HealthState::Unhealthy, _) | (_, CircuitHealth::Open) => HealthState::Unhealthy,
            (HealthState::Degraded, _) => HealthState::Degraded,
            _ => HealthState::Healthy,
        };

        Self {
            database,
            circuit_breaker,
            overall,
        }
    }
}

/// The full diagnostics payload.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub generated_at: DateTime<Utc>,
    pub database: ConnectionStatus,
    pub metrics: MetricsSnapshot,
    pub health: HealthRollup,
}

impl DiagnosticsReport {
    /// Assemble a report from the manager's status and the registry's
    /// snapshot.
    pub async fn collect(manager: &ConnectionManager, registry: &MetricsRegistry) -> Self {
        let database = manager.status().await;
        let health = HealthRollup::from_status(&database);
        Self {
            generated_at: Utc::now(),
            database,
            metrics: registry.snapshot(),
            health,
        }
    }
}
