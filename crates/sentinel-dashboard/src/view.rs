use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use sentinel_client_core::Identity;
use tracing::info;

use crate::metrics::MetricsSnapshot;
use crate::refresh::{RefreshHandle, RefreshStats, SharedSlot, lock_slot, new_slot};
use crate::source::MetricsSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardHeader {
    pub display_name: String,
    pub avatar_initial: char,
}

impl DashboardHeader {
    #[must_use]
    pub fn for_identity(identity: Option<&Identity>) -> Self {
        let fallback = Identity::default();
        let identity = identity.unwrap_or(&fallback);
        Self {
            display_name: identity.display_name().to_string(),
            avatar_initial: identity.avatar_initial(),
        }
    }
}

/// The dashboard screen. Owns its metrics snapshot and at most one refresh
/// timer, both of which live only between [`Self::mount`] and
/// [`Self::unmount`] (or drop).
pub struct DashboardView {
    source: Arc<dyn MetricsSource>,
    period: Duration,
    header: DashboardHeader,
    slot: Option<SharedSlot>,
    timer: Option<RefreshHandle>,
    live_timers: Arc<AtomicUsize>,
}

impl DashboardView {
    pub fn new(source: Arc<dyn MetricsSource>, period: Duration) -> Self {
        Self {
            source,
            period,
            header: DashboardHeader::for_identity(None),
            slot: None,
            timer: None,
            live_timers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_identity(&mut self, identity: Option<&Identity>) {
        self.header = DashboardHeader::for_identity(identity);
    }

    #[must_use]
    pub fn header(&self) -> &DashboardHeader {
        &self.header
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Populates a fresh snapshot and starts the refresh timer. Mounting an
    /// already mounted view tears the previous timer down first.
    pub async fn mount(&mut self) {
        if self.is_mounted() {
            self.unmount();
        }

        let slot = new_slot();
        let initial = self.source.fetch(Utc::now()).await;
        lock_slot(&slot).apply(initial, false);

        self.timer = Some(RefreshHandle::spawn(
            Arc::clone(&self.source),
            Arc::clone(&slot),
            self.period,
            Arc::clone(&self.live_timers),
        ));
        self.slot = Some(slot);
        info!(period_ms = self.period.as_millis() as u64, "dashboard mounted");
    }

    /// Cancels the refresh timer and discards the snapshot.
    pub fn unmount(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
            info!("dashboard unmounted");
        }
        self.slot = None;
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.timer.is_some()
    }

    /// Current snapshot; empty while unmounted.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.slot
            .as_ref()
            .map(|slot| lock_slot(slot).snapshot().clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn stats(&self) -> RefreshStats {
        self.slot
            .as_ref()
            .map(|slot| lock_slot(slot).stats().clone())
            .unwrap_or_default()
    }

    /// Refresh timers currently running for this view.
    #[must_use]
    pub fn live_timers(&self) -> usize {
        self.live_timers.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SERIES_LEN;
    use crate::source::{MetricsSourceError, SyntheticMetricsSource};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::AtomicU64;

    const PERIOD: Duration = Duration::from_secs(30);

    #[derive(Default)]
    struct ProbeSource {
        inner: Option<SyntheticMetricsSource>,
        delay: Option<Duration>,
        fail_on_calls: Vec<u64>,
        started: AtomicU64,
        completed: AtomicU64,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ProbeSource {
        fn synthetic() -> Self {
            Self {
                inner: Some(SyntheticMetricsSource::seeded(9)),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MetricsSource for ProbeSource {
        async fn fetch(
            &self,
            reference: DateTime<Utc>,
        ) -> Result<MetricsSnapshot, MetricsSourceError> {
            let call = self.started.fetch_add(1, Ordering::SeqCst) + 1;
            let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_calls.contains(&call) {
                return Err(MetricsSourceError::Malformed {
                    series: vec!["requestRate"],
                });
            }
            Ok(self
                .inner
                .as_ref()
                .map(|inner| inner.generate(reference))
                .unwrap_or_default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn mount_populates_before_returning() {
        let source = Arc::new(ProbeSource::synthetic());
        let mut view = DashboardView::new(source.clone(), PERIOD);
        assert!(view.snapshot().is_empty());

        view.mount().await;
        assert_eq!(view.snapshot().request_rate.len(), SERIES_LEN);
        assert_eq!(source.completed.load(Ordering::SeqCst), 1);
        assert_eq!(view.stats().ticks, 0);
        assert_eq!(view.live_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_stays_twelve_points_across_periods() {
        let source = Arc::new(ProbeSource::synthetic());
        let mut view = DashboardView::new(source.clone(), PERIOD);
        view.mount().await;

        let mut previous = view.snapshot();
        // observe just after each tick rather than on the tick boundary
        tokio::time::sleep(Duration::from_secs(1)).await;
        for period in 1..=5_u64 {
            tokio::time::sleep(PERIOD).await;
            let snapshot = view.snapshot();
            assert_eq!(snapshot.request_rate.len(), SERIES_LEN);
            assert_eq!(snapshot.error_rate.len(), SERIES_LEN);
            assert_eq!(snapshot.latency.len(), SERIES_LEN);
            assert!(view.live_timers() <= 1);
            assert_eq!(view.stats().ticks, period);
            assert_ne!(snapshot, previous);
            previous = snapshot;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn remount_never_leaves_two_timers() {
        let source = Arc::new(ProbeSource::synthetic());
        let mut view = DashboardView::new(source.clone(), PERIOD);
        view.mount().await;
        assert_eq!(view.live_timers(), 1);
        view.mount().await;
        assert_eq!(view.live_timers(), 1);
        view.mount().await;
        assert_eq!(view.live_timers(), 1);

        tokio::time::sleep(PERIOD * 2 + Duration::from_secs(1)).await;
        // three initial populations plus two ticks from the surviving timer
        assert_eq!(source.started.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_before_first_tick_stops_all_mutation() {
        let source = Arc::new(ProbeSource::synthetic());
        let mut view = DashboardView::new(source.clone(), PERIOD);
        view.mount().await;
        view.unmount();

        tokio::time::sleep(PERIOD * 5).await;
        assert_eq!(source.started.load(Ordering::SeqCst), 1);
        assert!(!view.is_mounted());
        assert!(view.snapshot().is_empty());
        assert_eq!(view.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_mid_fetch_discards_the_late_result() {
        let source = Arc::new(ProbeSource {
            delay: Some(Duration::from_secs(10)),
            ..ProbeSource::synthetic()
        });
        let mut view = DashboardView::new(source.clone(), PERIOD);
        view.mount().await;
        assert_eq!(source.completed.load(Ordering::SeqCst), 1);

        // first scheduled fetch starts 30s after mount and takes 10s
        tokio::time::sleep(PERIOD + Duration::from_secs(5)).await;
        assert_eq!(source.started.load(Ordering::SeqCst), 2);
        view.unmount();

        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(source.started.load(Ordering::SeqCst), 2);
        assert_eq!(source.completed.load(Ordering::SeqCst), 1);
        assert_eq!(view.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_never_overlaps_fetches() {
        let source = Arc::new(ProbeSource {
            delay: Some(Duration::from_secs(45)),
            ..ProbeSource::synthetic()
        });
        let mut view = DashboardView::new(source.clone(), PERIOD);
        view.mount().await;

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(source.started.load(Ordering::SeqCst) >= 3);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(view.snapshot().latency.len(), SERIES_LEN);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_keeps_previous_snapshot_and_schedule() {
        let source = Arc::new(ProbeSource {
            fail_on_calls: vec![2],
            ..ProbeSource::synthetic()
        });
        let mut view = DashboardView::new(source.clone(), PERIOD);
        view.mount().await;
        let initial = view.snapshot();

        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
        assert_eq!(view.snapshot(), initial);
        let stats = view.stats();
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.failures, 1);
        assert!(stats.last_error.is_some());

        tokio::time::sleep(PERIOD).await;
        let stats = view.stats();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.last_error, None);
        assert_ne!(view.snapshot(), initial);
        assert_eq!(view.snapshot().request_rate.len(), SERIES_LEN);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_initial_population_still_schedules() {
        let source = Arc::new(ProbeSource {
            fail_on_calls: vec![1],
            ..ProbeSource::synthetic()
        });
        let mut view = DashboardView::new(source.clone(), PERIOD);
        view.mount().await;
        assert!(view.snapshot().is_empty());
        assert_eq!(view.stats().failures, 1);

        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
        assert_eq!(view.snapshot().request_rate.len(), SERIES_LEN);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_mounted_view_releases_its_timer() {
        let source = Arc::new(ProbeSource::synthetic());
        let mut view = DashboardView::new(source.clone(), PERIOD);
        view.mount().await;
        drop(view);

        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(source.started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn header_reflects_identity() {
        let header = DashboardHeader::for_identity(Some(&Identity::with_username("admin")));
        assert_eq!(header.display_name, "admin");
        assert_eq!(header.avatar_initial, 'A');

        let anonymous = DashboardHeader::for_identity(None);
        assert_eq!(anonymous.display_name, "User");
        assert_eq!(anonymous.avatar_initial, 'U');
    }
}
