//! Circuit breaker gating access to the external store
//!
//! Tracks consecutive query failures. At the threshold the circuit opens
//! and callers fail fast to the fallback path; once the reset window has
//! elapsed since the last failure, the next `is_open` check closes the
//! circuit again and the live path gets retried.
//!
//! The open-to-closed transition is evaluated lazily on the next check
//! rather than by a background timer.
//!
//! # Example
//!
//! ```
//! use axiom_datasource::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
//! assert!(!breaker.is_open());
//!
//! for _ in 0..5 {
//!     breaker.record_failure();
//! }
//! assert!(breaker.is_open());
//!
//! breaker.record_success();
//! assert!(!breaker.is_open());
//! ```

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long after the last failure the circuit stays open.
    pub reset_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_window: Duration::from_secs(60),
        }
    }
}

/// Externally visible breaker state, for the diagnostics surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub open: bool,
    pub consecutive_failures: u32,
    /// Milliseconds since the last recorded failure, if any.
    pub last_failure_age_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    open: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            last_failure: None,
            open: false,
        }
    }

    /// Apply the lazy open-to-closed transition, returning whether the
    /// circuit is open after it.
    fn effective_open(&mut self, reset_window: Duration) -> bool {
        if self.open {
            if let Some(last) = self.last_failure {
                if last.elapsed() > reset_window {
                    self.open = false;
                    self.consecutive_failures = 0;
                    tracing::info!(event = "circuit_breaker.closed", "reset window elapsed");
                }
            }
        }
        self.open
    }
}

/// Failure-count circuit breaker shared across the connection manager
/// and the store. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(BreakerState::new())),
        }
    }

    /// Create a new circuit breaker with default configuration.
    pub fn new_default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Record a successful call. Resets the failure count and closes the
    /// circuit if it was open.
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker state poisoned");
        if state.open {
            tracing::info!(event = "circuit_breaker.closed", "dependency recovered");
        }
        state.open = false;
        state.consecutive_failures = 0;
        state.last_failure = None;
    }

    /// Record a failed call. Opens the circuit when the consecutive
    /// failure count reaches the threshold.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker state poisoned");
        state.consecutive_failures += 1;
        state.last_failure = Some(Instant::now());

        if !state.open && state.consecutive_failures >= self.config.failure_threshold {
            state.open = true;
            tracing::warn!(
                event = "circuit_breaker.open",
                consecutive_failures = state.consecutive_failures,
                "failure threshold reached"
            );
        }
    }

    /// Whether the circuit is currently open.
    ///
    /// Performs the lazy reset: an open circuit whose reset window has
    /// elapsed since the last failure closes here, with the failure
    /// count cleared.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().expect("breaker state poisoned");
        state.effective_open(self.config.reset_window)
    }

    /// Current failure count.
    pub fn failure_count(&self) -> u32 {
        let state = self.state.lock().expect("breaker state poisoned");
        state.consecutive_failures
    }

    /// Snapshot of the breaker for diagnostics. Applies the same lazy
    /// reset as [`is_open`](Self::is_open).
    pub fn status(&self) -> BreakerStatus {
        let mut state = self.state.lock().expect("breaker state poisoned");
        let open = state.effective_open(self.config.reset_window);
        BreakerStatus {
            open,
            consecutive_failures: state.consecutive_failures,
            last_failure_age_ms: state
                .last_failure
                .map(|t| t.elapsed().as_millis() as u64),
        }
    }

    /// Reset to the initial closed state. Test hook.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("breaker state poisoned");
        *state = BreakerState::new();
    }
}
