//! In-memory fixed-window rate limiter
//!
//! The limiter used when no external rate-limit service is configured.
//! Each key gets a fixed window: the first hit opens it, hits inside it
//! count against the limit, and a hit after the window expires starts a
//! fresh one. Pure logic: callers decide what to do with a denial and
//! record their own metrics.
//!
//! # Example
//!
//! ```
//! use axiom_datasource::rate_limiter::RateLimiter;
//!
//! let limiter = RateLimiter::per_minute(5);
//! let decision = limiter.check("203.0.113.7");
//! assert!(decision.allowed);
//! assert_eq!(decision.remaining, 4);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Configuration for fixed-window limiting.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Hits allowed per window.
    pub limit: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Hits left in the current window.
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_in: Duration,
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    reset_at: Instant,
}

/// Keyed fixed-window limiter. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    config: Arc<RateLimiterConfig>,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config: Arc::new(config),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `limit` hits per minute.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(RateLimiterConfig {
            limit,
            window: Duration::from_secs(60),
        })
    }

    /// Count a hit for `key` and decide whether it is allowed.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter poisoned");

        match windows.get_mut(key) {
            Some(window) if now < window.reset_at => {
                if window.count >= self.config.limit {
                    return RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_in: window.reset_at - now,
                    };
                }
                window.count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining: self.config.limit - window.count,
                    reset_in: window.reset_at - now,
                }
            }
            _ => {
                // no window, or the previous one expired: start fresh
                let reset_at = now + self.config.window;
                windows.insert(
                    key.to_string(),
                    WindowState { count: 1, reset_at },
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: self.config.limit.saturating_sub(1),
                    reset_in: self.config.window,
                }
            }
        }
    }

    /// Drop windows that have already expired, bounding memory on
    /// long-running processes with high key cardinality.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter poisoned");
        windows.retain(|_, window| now < window.reset_at);
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().expect("rate limiter poisoned").len()
    }
}
