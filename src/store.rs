//! Fetch-with-fallback orchestration
//!
//! [`MetricsStore::load_records`] is the only entry point callers use.
//! It always returns a result: live rows when the dependency cooperates,
//! the compiled-in fallback dataset otherwise. Failures are recorded
//! into the circuit breaker and the metrics registry and logged, but
//! never propagated, so callers can treat the store as infallible and
//! branch on the `source` field when they care.
//!
//! An empty live result is not trusted as authoritative: a
//! partially-migrated or truncated table should not masquerade as "no
//! data", so it is substituted with the fallback dataset and counted
//! separately.

use crate::circuit_breaker::CircuitBreaker;
use crate::config::StoreConfig;
use crate::connection::ConnectionManager;
use crate::metrics::MetricsRegistry;
use crate::records::{fallback_records, MetricRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Load attempts, live or fallback.
pub const LOAD_TOTAL: &str = "axiom_records_load_total";
/// Loads served from the fallback dataset because no connection was
/// available.
pub const LOAD_FALLBACK_TOTAL: &str = "axiom_records_fallback_total";
/// Queries that completed successfully.
pub const LOAD_SUCCESS_TOTAL: &str = "axiom_records_success_total";
/// Queries that failed or timed out.
pub const LOAD_ERROR_TOTAL: &str = "axiom_records_error_total";
/// Successful queries that returned zero rows and were substituted.
pub const LOAD_EMPTY_TOTAL: &str = "axiom_records_empty_total";
/// End-to-end load duration, milliseconds.
pub const LOAD_DURATION_MS: &str = "axiom_records_load_duration_ms";

/// Where a [`RecordSet`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Live,
    Fallback,
}

/// The accessor's result: records plus provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSet {
    pub records: Vec<MetricRecord>,
    pub source: RecordSource,
    pub fetched_at: DateTime<Utc>,
}

/// Resilient accessor over the external metrics store.
pub struct MetricsStore {
    manager: ConnectionManager,
    breaker: CircuitBreaker,
    metrics: MetricsRegistry,
    config: StoreConfig,
}

impl MetricsStore {
    pub fn new(
        manager: ConnectionManager,
        breaker: CircuitBreaker,
        metrics: MetricsRegistry,
        config: StoreConfig,
    ) -> Self {
        Self {
            manager,
            breaker,
            metrics,
            config,
        }
    }

    /// Fetch the domain records, falling back to the static dataset when
    /// the live path is unavailable, failing, or untrusted. Never
    /// returns an error.
    pub async fn load_records(&self) -> RecordSet {
        let started = Instant::now();
        self.metrics.incr(LOAD_TOTAL);

        let Some(handle) = self.manager.get_live_connection().await else {
            self.metrics.incr(LOAD_FALLBACK_TOTAL);
            self.metrics.record_duration(LOAD_DURATION_MS, started);
            return Self::fallback_set();
        };

        let query = handle.executor().fetch_records();
        match tokio::time::timeout(self.config.query_timeout, query).await {
            Ok(Ok(records)) => {
                self.breaker.record_success();
                self.metrics.incr(LOAD_SUCCESS_TOTAL);
                self.metrics.record_duration(LOAD_DURATION_MS, started);

                if records.is_empty() {
                    self.metrics.incr(LOAD_EMPTY_TOTAL);
                    tracing::warn!(
                        event = "query.empty",
                        "live query returned no rows; substituting fallback data"
                    );
                    return Self::fallback_set();
                }

                RecordSet {
                    records,
                    source: RecordSource::Live,
                    fetched_at: Utc::now(),
                }
            }
            Ok(Err(error)) => {
                self.breaker.record_failure();
                self.metrics.incr(LOAD_ERROR_TOTAL);
                self.metrics.record_duration(LOAD_DURATION_MS, started);
                tracing::warn!(event = "query.error", error = %error, "falling back");
                Self::fallback_set()
            }
            Err(_) => {
                self.breaker.record_failure();
                self.metrics.incr(LOAD_ERROR_TOTAL);
                self.metrics.record_duration(LOAD_DURATION_MS, started);
                tracing::warn!(
                    event = "query.error",
                    timeout_ms = self.config.query_timeout.as_millis() as u64,
                    "query timed out; falling back"
                );
                Self::fallback_set()
            }
        }
    }

    fn fallback_set() -> RecordSet {
        RecordSet {
            records: fallback_records().to_vec(),
            source: RecordSource::Fallback,
            fetched_at: Utc::now(),
        }
    }
}
