//! Single-slot connection manager for the external store
//!
//! Lazily establishes one logical connection, reuses it until it ages
//! out or a health probe fails, and retires it afterwards. Establishment
//! runs in the background: a caller that finds the slot cold gets `None`
//! for this call (and therefore the fallback path) while the replacement
//! handle is built for subsequent calls. The caller-facing path never
//! blocks on a cold start.
//!
//! Failure routing is asymmetric: connection-establishment failures are
//! retried locally with linear backoff and health-probe failures only
//! downgrade the cached handle, while the circuit breaker is fed
//! exclusively by failures on the query call path (see the store).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use axiom_datasource::circuit_breaker::CircuitBreaker;
//! use axiom_datasource::config::{resolve_target, ConnectionConfig};
//! use axiom_datasource::connection::{ConnectionManager, Connector};
//! use axiom_datasource::metrics::MetricsRegistry;
//!
//! # fn wire(connector: Arc<dyn Connector>) {
//! let target = resolve_target(std::env::var("DATABASE_URL_UNPOOLED").ok(), None);
//! let manager = ConnectionManager::new(
//!     ConnectionConfig::default(),
//!     target,
//!     connector,
//!     CircuitBreaker::new_default(),
//!     MetricsRegistry::new(),
//! );
//! manager.spawn_health_loop();
//! # }
//! ```

use crate::circuit_breaker::{BreakerStatus, CircuitBreaker};
use crate::config::{ConnectionConfig, ConnectionMode, ConnectionTarget};
use crate::error::DatasourceError;
use crate::metrics::MetricsRegistry;
use crate::records::MetricRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Connection attempts, successful or not.
pub const CONNECT_ATTEMPTS_TOTAL: &str = "axiom_db_connect_attempts_total";
/// Connection attempts that failed or timed out.
pub const CONNECT_FAILURES_TOTAL: &str = "axiom_db_connect_failures_total";
/// Periodic health probes that failed or timed out.
pub const HEALTH_CHECK_FAILURES_TOTAL: &str = "axiom_db_health_check_failures_total";

/// The two statements the store needs from a driver: a trivial probe and
/// the one SELECT-shaped domain query.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a trivial statement to verify the connection is alive.
    async fn probe(&self) -> Result<(), DatasourceError>;

    /// Fetch the domain records.
    async fn fetch_records(&self) -> Result<Vec<MetricRecord>, DatasourceError>;
}

/// Factory seam between the manager and a concrete driver.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<Arc<dyn QueryExecutor>, DatasourceError>;
}

/// The manager's cached reference to a live connection, with the
/// metadata used to decide reuse and retirement.
pub struct ConnectionHandle {
    executor: Arc<dyn QueryExecutor>,
    mode: ConnectionMode,
    created_at: Instant,
    last_used: Mutex<Instant>,
    use_count: AtomicU64,
    healthy: AtomicBool,
}

impl ConnectionHandle {
    fn new(executor: Arc<dyn QueryExecutor>, mode: ConnectionMode) -> Self {
        let now = Instant::now();
        Self {
            executor,
            mode,
            created_at: now,
            last_used: Mutex::new(now),
            use_count: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the handle last served a caller.
    pub fn idle_time(&self) -> Duration {
        self.last_used
            .lock()
            .expect("handle clock poisoned")
            .elapsed()
    }

    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::Relaxed)
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Relaxed);
    }

    fn is_expired(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }

    fn touch(&self) {
        *self.last_used.lock().expect("handle clock poisoned") = Instant::now();
        self.use_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Connection state for the diagnostics surface.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub healthy: bool,
    pub age_secs: Option<u64>,
    pub use_count: Option<u64>,
    pub mode: Option<ConnectionMode>,
    pub breaker: BreakerStatus,
}

struct ManagerInner {
    config: ConnectionConfig,
    target: Option<ConnectionTarget>,
    connector: Arc<dyn Connector>,
    breaker: CircuitBreaker,
    metrics: MetricsRegistry,
    slot: RwLock<Option<Arc<ConnectionHandle>>>,
    establishing: AtomicBool,
}

/// Lazily establishes, reuses, ages out, and health-checks a single
/// logical connection. Cheap to clone; clones share the slot.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        target: Option<ConnectionTarget>,
        connector: Arc<dyn Connector>,
        breaker: CircuitBreaker,
        metrics: MetricsRegistry,
    ) -> Self {
        if target.is_none() {
            tracing::warn!(
                event = "connection.unconfigured",
                "no connection target configured; serving fallback data"
            );
        }
        Self {
            inner: Arc::new(ManagerInner {
                config,
                target,
                connector,
                breaker,
                metrics,
                slot: RwLock::new(None),
                establishing: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.target.is_some()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// Return the live connection, or `None` when the caller should take
    /// the fallback path.
    ///
    /// `None` covers three distinct situations: the breaker is open (no
    /// I/O is attempted at all), no target is configured, or the slot is
    /// cold. In the cold case a background establishment cycle is kicked
    /// off (at most one at a time) and this call returns without
    /// waiting for it.
    pub async fn get_live_connection(&self) -> Option<Arc<ConnectionHandle>> {
        if self.inner.breaker.is_open() {
            return None;
        }

        {
            let slot = self.inner.slot.read().await;
            if let Some(handle) = slot.as_ref() {
                if handle.is_healthy() && !handle.is_expired(self.inner.config.max_age) {
                    handle.touch();
                    return Some(Arc::clone(handle));
                }
            }
        }

        {
            let mut slot = self.inner.slot.write().await;
            if let Some(handle) = slot.as_ref() {
                if handle.is_healthy() && !handle.is_expired(self.inner.config.max_age) {
                    // a concurrent caller installed a fresh handle between locks
                    handle.touch();
                    return Some(Arc::clone(handle));
                }
                if handle.is_expired(self.inner.config.max_age) {
                    tracing::info!(
                        event = "connection.expired",
                        age_secs = handle.age().as_secs(),
                        idle_secs = handle.idle_time().as_secs(),
                        use_count = handle.use_count(),
                        "retiring aged handle"
                    );
                } else {
                    tracing::info!(event = "connection.evicted", "retiring unhealthy handle");
                }
                *slot = None;
            }
        }

        let target = self.inner.target.clone()?;
        self.spawn_establish(target);
        None
    }

    fn spawn_establish(&self, target: ConnectionTarget) {
        if self.inner.establishing.swap(true, Ordering::SeqCst) {
            // a creation cycle is already in flight
            return;
        }
        let manager = self.clone();
        tokio::spawn(async move {
            if let Some(handle) = manager.create_connection(&target).await {
                let mut slot = manager.inner.slot.write().await;
                *slot = Some(handle);
            }
            manager.inner.establishing.store(false, Ordering::SeqCst);
        });
    }

    /// Connect and probe, retrying with linear backoff. Returns `None`
    /// once the attempt budget is spent.
    pub async fn create_connection(
        &self,
        target: &ConnectionTarget,
    ) -> Option<Arc<ConnectionHandle>> {
        for attempt in 1..=self.inner.config.max_connect_attempts {
            self.inner.metrics.incr(CONNECT_ATTEMPTS_TOTAL);

            let establish = async {
                let executor = self.inner.connector.connect(target).await?;
                executor.probe().await?;
                Ok::<_, DatasourceError>(executor)
            };

            match tokio::time::timeout(self.inner.config.connect_timeout, establish).await {
                Ok(Ok(executor)) => {
                    tracing::info!(
                        event = "connection.created",
                        mode = ?target.mode,
                        attempt,
                        "probe succeeded"
                    );
                    return Some(Arc::new(ConnectionHandle::new(executor, target.mode)));
                }
                Ok(Err(error)) => {
                    self.inner.metrics.incr(CONNECT_FAILURES_TOTAL);
                    tracing::warn!(
                        event = "connection.failed",
                        attempt,
                        error = %error,
                        "connection attempt failed"
                    );
                }
                Err(_) => {
                    self.inner.metrics.incr(CONNECT_FAILURES_TOTAL);
                    tracing::warn!(
                        event = "connection.failed",
                        attempt,
                        timeout_ms = self.inner.config.connect_timeout.as_millis() as u64,
                        "connection attempt timed out"
                    );
                }
            }

            if attempt < self.inner.config.max_connect_attempts {
                // linear backoff between attempts
                tokio::time::sleep(self.inner.config.connect_backoff_base * attempt).await;
            }
        }
        None
    }

    /// Probe the handle within the health-check deadline. A failed probe
    /// downgrades the handle (it is replaced on the next
    /// [`get_live_connection`](Self::get_live_connection)) but does not
    /// feed the circuit breaker.
    pub async fn health_check(&self, handle: &ConnectionHandle) {
        let probe = handle.executor().probe();
        match tokio::time::timeout(self.inner.config.health_check_timeout, probe).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                self.inner.metrics.incr(HEALTH_CHECK_FAILURES_TOTAL);
                handle.mark_unhealthy();
                tracing::warn!(
                    event = "connection.unhealthy",
                    error = %error,
                    "health probe failed"
                );
            }
            Err(_) => {
                self.inner.metrics.incr(HEALTH_CHECK_FAILURES_TOTAL);
                handle.mark_unhealthy();
                tracing::warn!(event = "connection.unhealthy", "health probe timed out");
            }
        }
    }

    /// Run the health probe against the cached handle on a timer, for
    /// the life of the process.
    pub fn spawn_health_loop(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.inner.config.health_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately on the first tick; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let handle = manager.inner.slot.read().await.clone();
                if let Some(handle) = handle {
                    manager.health_check(&handle).await;
                }
            }
        })
    }

    /// Force-create a new connection now, replacing any cached handle.
    /// Returns whether a fresh handle was installed.
    pub async fn refresh(&self) -> bool {
        let Some(target) = self.inner.target.clone() else {
            return false;
        };
        match self.create_connection(&target).await {
            Some(handle) => {
                let mut slot = self.inner.slot.write().await;
                *slot = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the slot and breaker for the diagnostics surface.
    pub async fn status(&self) -> ConnectionStatus {
        let slot = self.inner.slot.read().await;
        let handle = slot.as_ref();
        ConnectionStatus {
            connected: handle.is_some(),
            healthy: handle.map(|h| h.is_healthy()).unwrap_or(false),
            age_secs: handle.map(|h| h.age().as_secs()),
            use_count: handle.map(|h| h.use_count()),
            mode: handle.map(|h| h.mode()),
            breaker: self.inner.breaker.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct TestExecutor {
        probe_ok: Arc<AtomicBool>,
        probes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueryExecutor for TestExecutor {
        async fn probe(&self) -> Result<(), DatasourceError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.probe_ok.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DatasourceError::Connect("probe failed".to_string()))
            }
        }

        async fn fetch_records(&self) -> Result<Vec<MetricRecord>, DatasourceError> {
            Ok(Vec::new())
        }
    }

    struct TestConnector {
        connects: AtomicUsize,
        fail_first: usize,
        probe_ok: Arc<AtomicBool>,
        probes: Arc<AtomicUsize>,
    }

    impl TestConnector {
        fn reliable() -> Self {
            Self::failing_first(0)
        }

        fn failing_first(fail_first: usize) -> Self {
            Self {
                connects: AtomicUsize::new(0),
                fail_first,
                probe_ok: Arc::new(AtomicBool::new(true)),
                probes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for TestConnector {
        async fn connect(
            &self,
            _target: &ConnectionTarget,
        ) -> Result<Arc<dyn QueryExecutor>, DatasourceError> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(DatasourceError::Connect("refused".to_string()));
            }
            Ok(Arc::new(TestExecutor {
                probe_ok: Arc::clone(&self.probe_ok),
                probes: Arc::clone(&self.probes),
            }))
        }
    }

    fn test_target() -> ConnectionTarget {
        ConnectionTarget {
            url: "postgres://test".to_string(),
            mode: ConnectionMode::Unpooled,
        }
    }

    fn fast_config() -> ConnectionConfig {
        ConnectionConfig {
            connect_backoff_base: Duration::from_millis(1),
            connect_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    fn manager(
        connector: Arc<TestConnector>,
        target: Option<ConnectionTarget>,
        config: ConnectionConfig,
    ) -> ConnectionManager {
        ConnectionManager::new(
            config,
            target,
            connector,
            CircuitBreaker::new_default(),
            MetricsRegistry::new(),
        )
    }

    #[tokio::test]
    async fn unconfigured_manager_never_connects() {
        let connector = Arc::new(TestConnector::reliable());
        let manager = manager(Arc::clone(&connector), None, fast_config());

        assert!(manager.get_live_connection().await.is_none());
        assert!(manager.get_live_connection().await.is_none());
        assert_eq!(connector.connect_count(), 0);
        assert!(!manager.is_configured());
    }

    #[tokio::test]
    async fn cold_start_returns_none_then_installs_handle() {
        let connector = Arc::new(TestConnector::reliable());
        let manager = manager(Arc::clone(&connector), Some(test_target()), fast_config());

        // Cold slot: this call must not block on establishment
        assert!(manager.get_live_connection().await.is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let handle = manager.get_live_connection().await.expect("warm handle");
        assert!(handle.is_healthy());
        assert_eq!(handle.mode(), ConnectionMode::Unpooled);
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_cold_callers_trigger_one_establishment() {
        let connector = Arc::new(TestConnector::reliable());
        let manager = manager(Arc::clone(&connector), Some(test_target()), fast_config());

        for _ in 0..5 {
            assert!(manager.get_live_connection().await.is_none());
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.get_live_connection().await.is_some());
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn reuse_bumps_use_count() {
        let connector = Arc::new(TestConnector::reliable());
        let manager = manager(Arc::clone(&connector), Some(test_target()), fast_config());

        assert!(manager.refresh().await);
        let first = manager.get_live_connection().await.expect("handle");
        let second = manager.get_live_connection().await.expect("handle");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.use_count(), 2);
    }

    #[tokio::test]
    async fn create_connection_retries_through_transient_failures() {
        let connector = Arc::new(TestConnector::failing_first(2));
        let manager = manager(Arc::clone(&connector), Some(test_target()), fast_config());

        let target = test_target();
        let handle = manager.create_connection(&target).await;
        assert!(handle.is_some());
        assert_eq!(connector.connect_count(), 3);
    }

    #[tokio::test]
    async fn create_connection_gives_up_after_attempt_budget() {
        let connector = Arc::new(TestConnector::failing_first(usize::MAX));
        let registry = MetricsRegistry::new();
        let manager = ConnectionManager::new(
            fast_config(),
            Some(test_target()),
            Arc::clone(&connector) as Arc<dyn Connector>,
            CircuitBreaker::new_default(),
            registry.clone(),
        );

        let target = test_target();
        assert!(manager.create_connection(&target).await.is_none());
        assert_eq!(connector.connect_count(), 3);
        assert_eq!(registry.counter_value(CONNECT_ATTEMPTS_TOTAL), 3.0);
        assert_eq!(registry.counter_value(CONNECT_FAILURES_TOTAL), 3.0);
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_without_io() {
        let connector = Arc::new(TestConnector::reliable());
        let breaker = CircuitBreaker::new_default();
        let manager = ConnectionManager::new(
            fast_config(),
            Some(test_target()),
            Arc::clone(&connector) as Arc<dyn Connector>,
            breaker.clone(),
            MetricsRegistry::new(),
        );

        for _ in 0..5 {
            breaker.record_failure();
        }

        assert!(manager.get_live_connection().await.is_none());
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn expired_handle_is_retired_and_replaced() {
        let connector = Arc::new(TestConnector::reliable());
        let config = ConnectionConfig {
            max_age: Duration::from_millis(30),
            ..fast_config()
        };
        let manager = manager(Arc::clone(&connector), Some(test_target()), config);

        assert!(manager.refresh().await);
        assert!(manager.get_live_connection().await.is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Aged out: this call evicts and falls back while replacing
        assert!(manager.get_live_connection().await.is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.get_live_connection().await.is_some());
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn failed_health_probe_downgrades_handle_not_breaker() {
        let connector = Arc::new(TestConnector::reliable());
        let registry = MetricsRegistry::new();
        let breaker = CircuitBreaker::new_default();
        let manager = ConnectionManager::new(
            fast_config(),
            Some(test_target()),
            Arc::clone(&connector) as Arc<dyn Connector>,
            breaker.clone(),
            registry.clone(),
        );

        assert!(manager.refresh().await);
        let handle = manager.get_live_connection().await.expect("handle");

        connector.probe_ok.store(false, Ordering::SeqCst);
        manager.health_check(&handle).await;

        assert!(!handle.is_healthy());
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(registry.counter_value(HEALTH_CHECK_FAILURES_TOTAL), 1.0);

        // The downgraded handle is retired on the next call
        connector.probe_ok.store(true, Ordering::SeqCst);
        assert!(manager.get_live_connection().await.is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let replacement = manager.get_live_connection().await.expect("replacement");
        assert!(replacement.is_healthy());
    }

    #[tokio::test]
    async fn refresh_replaces_the_cached_handle() {
        let connector = Arc::new(TestConnector::reliable());
        let manager = manager(Arc::clone(&connector), Some(test_target()), fast_config());

        assert!(manager.refresh().await);
        let first = manager.get_live_connection().await.expect("handle");

        assert!(manager.refresh().await);
        let second = manager.get_live_connection().await.expect("handle");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn refresh_without_target_is_a_noop() {
        let connector = Arc::new(TestConnector::reliable());
        let manager = manager(Arc::clone(&connector), None, fast_config());

        assert!(!manager.refresh().await);
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn status_reflects_slot_and_breaker() {
        let connector = Arc::new(TestConnector::reliable());
        let manager = manager(Arc::clone(&connector), Some(test_target()), fast_config());

        let status = manager.status().await;
        assert!(!status.connected);
        assert!(!status.healthy);
        assert!(status.mode.is_none());
        assert!(!status.breaker.open);

        assert!(manager.refresh().await);
        manager.get_live_connection().await.expect("handle");

        let status = manager.status().await;
        assert!(status.connected);
        assert!(status.healthy);
        assert_eq!(status.mode, Some(ConnectionMode::Unpooled));
        assert_eq!(status.use_count, Some(1));

        let json = serde_json::to_value(&status).expect("status should serialize");
        assert_eq!(json["connected"], true);
        assert_eq!(json["mode"], "unpooled");
        assert!(json["breaker"].get("open").is_some());
    }

    #[tokio::test]
    async fn health_loop_probes_the_cached_handle() {
        let connector = Arc::new(TestConnector::reliable());
        let config = ConnectionConfig {
            health_check_interval: Duration::from_millis(20),
            ..fast_config()
        };
        let manager = manager(Arc::clone(&connector), Some(test_target()), config);

        assert!(manager.refresh().await);
        let probes_before = connector.probes.load(Ordering::SeqCst);

        let loop_handle = manager.spawn_health_loop();
        tokio::time::sleep(Duration::from_millis(70)).await;
        loop_handle.abort();

        assert!(connector.probes.load(Ordering::SeqCst) > probes_before);
    }
}
