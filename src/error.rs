//! Error types for the datasource layer
//!
//! These errors circulate between the connection manager, the query
//! executor seam, and the store. None of them cross the store's public
//! boundary: `MetricsStore::load_records` converts every failure into a
//! fallback result and surfaces the cause through metrics and logs only.

use std::time::Duration;
use thiserror::Error;

/// Failure modes of the live data path.
#[derive(Debug, Error)]
pub enum DatasourceError {
    /// No live connection is available (breaker open, slot cold, or no
    /// target configured).
    #[error("no live connection available")]
    ConnectionUnavailable,

    /// Establishing or probing a connection failed.
    #[error("connection attempt failed: {0}")]
    Connect(String),

    /// The domain query exceeded its deadline.
    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),

    /// The domain query failed outright.
    #[error("query failed: {0}")]
    Query(String),

    /// The live query returned zero rows. Not trusted as authoritative;
    /// treated the same as an unavailable store.
    #[error("live query returned no rows")]
    EmptyResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_the_cause() {
        let error = DatasourceError::Query("relation \"axiom_metrics\" does not exist".to_string());
        assert!(error.to_string().contains("axiom_metrics"));

        let error = DatasourceError::QueryTimeout(Duration::from_secs(10));
        assert!(error.to_string().contains("timed out"));
    }
}
