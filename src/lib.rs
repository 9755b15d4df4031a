//! Axiom Datasource: resilient access to an external metrics store
//!
//! # Overview
//!
//! This crate provides the data-access core behind a metrics surface
//! that must keep answering even when its database is slow, absent, or
//! broken. It is built from four cooperating pieces:
//!
//! - **MetricsRegistry**: process-wide counters and summary histograms,
//!   queryable as a snapshot
//! - **CircuitBreaker**: consecutive-failure gate with a lazy cool-down
//!   reset, preventing repeated calls to a failing dependency
//! - **ConnectionManager**: single-slot lazy connection with aging,
//!   bounded retries, background establishment, and a health-check loop
//! - **MetricsStore**: the accessor callers use; always returns a
//!   result, live or fallback, never an error
//!
//! Supporting pieces: a compiled-in fallback dataset, a keyed
//! fixed-window [`rate_limiter`], and a [`diagnostics`] report that
//! rolls the whole picture up for operators.
//!
//! # Key principles
//!
//! The crate is pure logic over two trait seams,
//! [`Connector`](connection::Connector) and
//! [`QueryExecutor`](connection::QueryExecutor), and knows nothing
//! about a concrete driver, wire protocol, or HTTP framework. All shared
//! state is held in explicit objects constructed once at process start
//! and injected where needed; there are no ambient globals.
//!
//! Failure never reaches the caller: every path through
//! [`MetricsStore::load_records`](store::MetricsStore::load_records)
//! resolves to a `RecordSet` whose `source` field is the only visible
//! difference between live and fallback data.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use axiom_datasource::prelude::*;
//!
//! # async fn wire(connector: Arc<dyn Connector>) {
//! let config = DatasourceConfig::from_env();
//! let metrics = MetricsRegistry::new();
//! let breaker = CircuitBreaker::new(config.breaker.clone());
//!
//! let manager = ConnectionManager::new(
//!     config.connection.clone(),
//!     config.target.clone(),
//!     connector,
//!     breaker.clone(),
//!     metrics.clone(),
//! );
//! manager.spawn_health_loop();
//!
//! let store = MetricsStore::new(manager.clone(), breaker, metrics.clone(), config.store);
//!
//! let set = store.load_records().await;
//! println!("{} records from {:?}", set.records.len(), set.source);
//!
//! let report = DiagnosticsReport::collect(&manager, &metrics).await;
//! println!("overall health: {:?}", report.health.overall);
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod rate_limiter;
pub mod records;
pub mod store;

// Re-export main types for convenience
pub use circuit_breaker::{BreakerStatus, CircuitBreaker, CircuitBreakerConfig};
pub use config::{
    resolve_target, ConnectionConfig, ConnectionMode, ConnectionTarget, DatasourceConfig,
    StoreConfig,
};
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionStatus, Connector, QueryExecutor};
pub use diagnostics::{CircuitHealth, DiagnosticsReport, HealthRollup, HealthState};
pub use error::DatasourceError;
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use rate_limiter::{RateLimitDecision, RateLimiter, RateLimiterConfig};
pub use records::{fallback_records, MetricRecord};
pub use store::{MetricsStore, RecordSet, RecordSource};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use axiom_datasource::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    pub use super::config::{ConnectionMode, ConnectionTarget, DatasourceConfig};
    pub use super::connection::{ConnectionManager, Connector, QueryExecutor};
    pub use super::diagnostics::DiagnosticsReport;
    pub use super::error::DatasourceError;
    pub use super::metrics::MetricsRegistry;
    pub use super::rate_limiter::RateLimiter;
    pub use super::records::MetricRecord;
    pub use super::store::{MetricsStore, RecordSet, RecordSource};
}
