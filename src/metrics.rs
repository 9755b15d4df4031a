//! In-process metrics: named counters and summary histograms
//!
//! The registry is the write-many/read-once shared surface of the crate:
//! every component records into it and the diagnostics reporter reads it
//! back as a snapshot. Histograms keep count/sum/min/max only, enough
//! for a health payload without retaining observations.
//!
//! A metric name denotes exactly one kind, fixed at first use. Counters
//! and histograms live in separate maps; a call of the wrong kind for an
//! already-registered name is ignored rather than panicking, since the
//! registry sits on monitoring paths.
//!
//! # Example
//!
//! ```
//! use axiom_datasource::metrics::MetricsRegistry;
//!
//! let metrics = MetricsRegistry::new();
//! metrics.incr("requests_total");
//! metrics.observe("request_duration_ms", 12.5);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.counters[0].value, 1.0);
//! assert_eq!(snapshot.histograms[0].count, 1);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A named monotonic counter at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSample {
    pub name: String,
    pub value: f64,
}

/// A named summary histogram at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSample {
    pub name: String,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

/// Point-in-time view of the whole registry, sorted by name so repeated
/// snapshots diff cleanly.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: Vec<CounterSample>,
    pub histograms: Vec<HistogramSample>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct HistogramState {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

#[derive(Debug, Default)]
struct RegistryInner {
    counters: HashMap<String, f64>,
    histograms: HashMap<String, HistogramState>,
}

/// Shared counter/histogram registry.
///
/// Cheap to clone; clones share state, so one registry constructed at
/// process start can be handed to every component.
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to the named counter, creating it at zero if absent.
    pub fn increment(&self, name: &str, amount: f64) {
        let mut inner = self.inner.lock().expect("metrics registry poisoned");
        if inner.histograms.contains_key(name) {
            return;
        }
        *inner.counters.entry(name.to_string()).or_insert(0.0) += amount;
    }

    /// Increment the named counter by one.
    pub fn incr(&self, name: &str) {
        self.increment(name, 1.0);
    }

    /// Record one observation into the named histogram.
    pub fn observe(&self, name: &str, value: f64) {
        let mut inner = self.inner.lock().expect("metrics registry poisoned");
        if inner.counters.contains_key(name) {
            return;
        }
        inner
            .histograms
            .entry(name.to_string())
            .and_modify(|h| {
                h.count += 1;
                h.sum += value;
                h.min = h.min.min(value);
                h.max = h.max.max(value);
            })
            .or_insert(HistogramState {
                count: 1,
                sum: value,
                min: value,
                max: value,
            });
    }

    /// Observe the elapsed time since `started`, in milliseconds.
    pub fn record_duration(&self, name: &str, started: Instant) {
        self.record_duration_between(name, started, Instant::now());
    }

    /// Observe the span between two instants, in milliseconds.
    ///
    /// An `end` earlier than `start` clamps to zero, so skewed clocks can
    /// never produce a negative duration observation.
    pub fn record_duration_between(&self, name: &str, start: Instant, end: Instant) {
        let elapsed = end.saturating_duration_since(start);
        self.observe(name, elapsed.as_secs_f64() * 1000.0);
    }

    /// Snapshot all counters and histograms, sorted by name.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().expect("metrics registry poisoned");

        let mut counters: Vec<CounterSample> = inner
            .counters
            .iter()
            .map(|(name, value)| CounterSample {
                name: name.clone(),
                value: *value,
            })
            .collect();
        counters.sort_by(|a, b| a.name.cmp(&b.name));

        let mut histograms: Vec<HistogramSample> = inner
            .histograms
            .iter()
            .map(|(name, h)| HistogramSample {
                name: name.clone(),
                count: h.count,
                sum: h.sum,
                min: h.min,
                max: h.max,
            })
            .collect();
        histograms.sort_by(|a, b| a.name.cmp(&b.name));

        MetricsSnapshot {
            counters,
            histograms,
            captured_at: Utc::now(),
        }
    }

    /// Read one counter's current value. Mostly useful in tests.
    pub fn counter_value(&self, name: &str) -> f64 {
        let inner = self.inner.lock().expect("metrics registry poisoned");
        inner.counters.get(name).copied().unwrap_or(0.0)
    }

    /// Clear all registered metrics. Test hook.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("metrics registry poisoned");
        inner.counters.clear();
        inner.histograms.clear();
    }
}
