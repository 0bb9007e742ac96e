//! Where dashboard metrics come from.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sentinel_api_client::{ApiClient, ApiClientError};
use thiserror::Error;

use crate::metrics::{MetricSample, MetricsSnapshot, ResourceSummary, time_label, window_instants};

pub const DEFAULT_METRICS_PATH: &str = "/metrics/dashboard";

/// Static cluster summary reported by the synthetic source.
pub const SYNTHETIC_RESOURCES: ResourceSummary = ResourceSummary {
    cpu: 65,
    memory: 72,
    pods: 12,
    nodes: 3,
};

#[derive(Debug, Error)]
pub enum MetricsSourceError {
    #[error("metrics request failed: {0}")]
    Api(#[from] ApiClientError),
    #[error("metrics snapshot has malformed series: {}", .series.join(","))]
    Malformed { series: Vec<&'static str> },
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Produces a complete snapshot for the window ending at `reference`.
    async fn fetch(&self, reference: DateTime<Utc>) -> Result<MetricsSnapshot, MetricsSourceError>;
}

/// Locally generated metrics with plausible ranges.
pub struct SyntheticMetricsSource {
    rng: Mutex<StdRng>,
}

impl SyntheticMetricsSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    #[must_use]
    pub fn generate(&self, reference: DateTime<Utc>) -> MetricsSnapshot {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        MetricsSnapshot {
            request_rate: synthetic_series(&mut *rng, reference),
            error_rate: synthetic_series(&mut *rng, reference),
            latency: synthetic_series(&mut *rng, reference),
            resources: SYNTHETIC_RESOURCES,
        }
    }
}

impl Default for SyntheticMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SyntheticMetricsSource {
    async fn fetch(&self, reference: DateTime<Utc>) -> Result<MetricsSnapshot, MetricsSourceError> {
        Ok(self.generate(reference))
    }
}

fn synthetic_series<R: Rng + ?Sized>(rng: &mut R, reference: DateTime<Utc>) -> Vec<MetricSample> {
    window_instants(reference)
        .into_iter()
        .map(|at| MetricSample {
            time: time_label(at),
            requests: rng.random_range(200..700),
            errors: rng.random_range(0..10),
            latency: rng.random_range(50..150),
            cpu: rng.random_range(30..70),
            memory: rng.random_range(50..80),
        })
        .collect()
}

/// Metrics served by the API under an authorized JSON endpoint.
pub struct HttpMetricsSource {
    client: ApiClient,
    path: String,
    access_token: String,
}

impl HttpMetricsSource {
    #[must_use]
    pub fn new(client: ApiClient, path: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn fetch(&self, _reference: DateTime<Utc>) -> Result<MetricsSnapshot, MetricsSourceError> {
        let snapshot: MetricsSnapshot = self
            .client
            .get_json_authorized(self.path.as_str(), self.access_token.as_str())
            .await?;
        let series = snapshot.malformed_series();
        if !series.is_empty() {
            return Err(MetricsSourceError::Malformed { series });
        }
        Ok(snapshot)
    }
}
