use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Points per series.
pub const SERIES_LEN: usize = 12;
/// Spacing between consecutive points, in minutes.
pub const SAMPLE_SPACING_MINUTES: i64 = 5;

const TIME_LABEL_FORMAT: &str = "%I:%M %p";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSample {
    pub time: String,
    pub requests: u32,
    pub errors: u32,
    pub latency: u32,
    pub cpu: u32,
    pub memory: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub cpu: u32,
    pub memory: u32,
    pub pods: u32,
    pub nodes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub request_rate: Vec<MetricSample>,
    pub error_rate: Vec<MetricSample>,
    pub latency: Vec<MetricSample>,
    pub resources: ResourceSummary,
}

impl MetricsSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.request_rate.is_empty() && self.error_rate.is_empty() && self.latency.is_empty()
    }

    /// Names of series whose length differs from [`SERIES_LEN`].
    #[must_use]
    pub fn malformed_series(&self) -> Vec<&'static str> {
        [
            ("requestRate", self.request_rate.len()),
            ("errorRate", self.error_rate.len()),
            ("latency", self.latency.len()),
        ]
        .into_iter()
        .filter(|(_, len)| *len != SERIES_LEN)
        .map(|(name, _)| name)
        .collect()
    }
}

/// Sample instants for a window ending at `reference`, oldest first.
#[must_use]
pub fn window_instants(reference: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    (0..SERIES_LEN as i64)
        .rev()
        .map(|steps_back| reference - TimeDelta::minutes(steps_back * SAMPLE_SPACING_MINUTES))
        .collect()
}

/// Two-digit 12-hour label, e.g. `03:05 PM`.
#[must_use]
pub fn time_label(at: DateTime<Utc>) -> String {
    at.format(TIME_LABEL_FORMAT).to_string()
}
