//! Operational metrics dashboard: snapshot model, metrics sources, and the
//! refresh loop that keeps a mounted dashboard current.

pub mod metrics;
pub mod refresh;
pub mod source;
pub mod view;

pub use metrics::{MetricSample, MetricsSnapshot, ResourceSummary, SERIES_LEN};
pub use refresh::{DEFAULT_REFRESH_PERIOD, RefreshHandle, RefreshStats};
pub use source::{
    DEFAULT_METRICS_PATH, HttpMetricsSource, MetricsSource, MetricsSourceError,
    SyntheticMetricsSource,
};
pub use view::{DashboardHeader, DashboardView};
