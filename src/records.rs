//! Domain records and the compiled-in fallback dataset

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// One row of the metrics store: a headline figure with its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    pub label: String,
    pub value: f64,
    pub unit: String,
    pub detail: String,
}

impl MetricRecord {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            value,
            unit: unit.into(),
            detail: detail.into(),
        }
    }
}

static FALLBACK_RECORDS: LazyLock<Vec<MetricRecord>> = LazyLock::new(|| {
    vec![
        MetricRecord::new(
            "uptime",
            "Platform uptime",
            99.98,
            "%",
            "Rolling 90-day availability across public surfaces",
        ),
        MetricRecord::new(
            "p95-latency",
            "API p95 latency",
            142.0,
            "ms",
            "Serverless route latency over the trailing 7 days",
        ),
        MetricRecord::new(
            "deploy-cadence",
            "Deploy cadence",
            4.0,
            "per week",
            "Median production deploys over the last quarter",
        ),
        MetricRecord::new(
            "error-budget",
            "Error budget remaining",
            87.0,
            "%",
            "Unspent budget for the current SLO window",
        ),
    ]
});

/// The static dataset served whenever the live store is unavailable or
/// untrusted. Always non-empty, immutable at runtime.
pub fn fallback_records() -> &'static [MetricRecord] {
    &FALLBACK_RECORDS
}
