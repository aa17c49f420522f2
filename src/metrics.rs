use crate::errors::DataSourceError;
use crate::models::{LeaderboardEntry, MetricsSnapshot};
use crate::stats::{rank_leaderboard, ReportWindows, LEADERBOARD_SIZE};
use crate::warehouse::Warehouse;
use chrono::{DateTime, Local};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// A query result and the wall-clock time it was read from the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    pub fetched_at: DateTime<Local>,
}

/// One cached query result. The lock is held across a fetch so callers
/// arriving mid-fetch wait for it instead of querying again.
struct TtlSlot<T> {
    ttl: Duration,
    entry: Mutex<Option<(Instant, Stamped<T>)>>,
}

impl<T: Clone> TtlSlot<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    async fn get_or_fetch<F, Fut>(&self, label: &'static str, fetch: F) -> Result<Stamped<T>, DataSourceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DataSourceError>>,
    {
        let mut entry = self.entry.lock().await;
        if let Some((started, cached)) = entry.as_ref() {
            if started.elapsed() < self.ttl {
                debug!(query = label, fetched_at = %cached.fetched_at, "cache hit");
                return Ok(cached.clone());
            }
        }
        // age is measured from when the query went out, not when it returned
        let started = Instant::now();
        let fetched_at = Local::now();
        let stamped = Stamped {
            value: fetch().await?,
            fetched_at,
        };
        *entry = Some((started, stamped.clone()));
        Ok(stamped)
    }
}

pub struct MetricsAggregator {
    warehouse: Arc<dyn Warehouse>,
    overall: TtlSlot<MetricsSnapshot>,
    leaderboard: TtlSlot<Vec<LeaderboardEntry>>,
}

impl MetricsAggregator {
    pub fn new(warehouse: Arc<dyn Warehouse>, cache_ttl: Duration) -> Self {
        Self {
            warehouse,
            overall: TtlSlot::new(cache_ttl),
            leaderboard: TtlSlot::new(cache_ttl),
        }
    }

    /// KPI totals for the latest week against the week before it.
    pub async fn fetch_overall_metrics(&self) -> Result<Stamped<MetricsSnapshot>, DataSourceError> {
        self.overall
            .get_or_fetch("overall_metrics", || async {
                let Some(reference) = self.warehouse.latest_activity_date().await? else {
                    info!(source = self.warehouse.name(), "warehouse has no activity yet");
                    return Ok(MetricsSnapshot::default());
                };
                let windows = ReportWindows::ending_at(reference);
                let snapshot = self.warehouse.window_totals(&windows).await?;
                info!(
                    source = self.warehouse.name(),
                    %reference,
                    streams = snapshot.streams.current,
                    "fetched overall metrics"
                );
                Ok::<_, DataSourceError>(snapshot)
            })
            .await
    }

    /// Top artists by streams over the latest week.
    pub async fn fetch_leaderboard(&self) -> Result<Stamped<Vec<LeaderboardEntry>>, DataSourceError> {
        self.leaderboard
            .get_or_fetch("artist_leaderboard", || async {
                let Some(reference) = self.warehouse.latest_activity_date().await? else {
                    return Ok(Vec::new());
                };
                let window = ReportWindows::ending_at(reference).current;
                let entries = self.warehouse.top_artists(&window, LEADERBOARD_SIZE).await?;
                debug!(rows = entries.len(), "fetched artist leaderboard");
                Ok::<_, DataSourceError>(rank_leaderboard(entries))
            })
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Paired;
    use crate::stats::DateWindow;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory warehouse that counts calls and can be told to fail.
    #[derive(Default)]
    pub(crate) struct FakeWarehouse {
        pub reference: Option<NaiveDate>,
        pub entries: Vec<LeaderboardEntry>,
        pub failing: AtomicBool,
        pub calls: AtomicUsize,
        pub delay: Duration,
        pub seen_windows: std::sync::Mutex<Vec<ReportWindows>>,
    }

    impl FakeWarehouse {
        pub(crate) fn with_data() -> Self {
            Self {
                reference: NaiveDate::from_ymd_opt(2026, 1, 14),
                entries: (0..12)
                    .map(|i| LeaderboardEntry {
                        artist_name: format!("Artist {i:02}"),
                        streams: 1_000 + i,
                        short_video_views: i,
                    })
                    .collect(),
                ..Self::default()
            }
        }

        async fn check(&self) -> Result<(), DataSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(DataSourceError::connection("warehouse unreachable"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Warehouse for FakeWarehouse {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn latest_activity_date(&self) -> Result<Option<NaiveDate>, DataSourceError> {
            self.check().await?;
            Ok(self.reference)
        }

        async fn window_totals(&self, windows: &ReportWindows) -> Result<MetricsSnapshot, DataSourceError> {
            self.check().await?;
            self.seen_windows.lock().unwrap().push(*windows);
            Ok(MetricsSnapshot {
                reference_date: Some(windows.reference),
                streams: Paired::new(150, 100),
                listeners: Paired::new(100, 150),
                ..MetricsSnapshot::default()
            })
        }

        async fn top_artists(
            &self,
            _window: &DateWindow,
            _limit: usize,
        ) -> Result<Vec<LeaderboardEntry>, DataSourceError> {
            self.check().await?;
            // unsorted and over-long on purpose
            Ok(self.entries.clone())
        }
    }

    #[tokio::test]
    async fn overall_metrics_use_windows_ending_at_latest_date() {
        let fake = Arc::new(FakeWarehouse::with_data());
        let aggregator = MetricsAggregator::new(fake.clone(), Duration::from_secs(300));

        let snapshot = aggregator.fetch_overall_metrics().await.unwrap().value;
        assert_eq!(snapshot.streams, Paired::new(150, 100));

        let seen = fake.seen_windows.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].current.end, NaiveDate::from_ymd_opt(2026, 1, 14).unwrap());
        assert_eq!(seen[0].previous.start, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }

    #[tokio::test]
    async fn leaderboard_is_ranked_and_capped() {
        let aggregator =
            MetricsAggregator::new(Arc::new(FakeWarehouse::with_data()), Duration::from_secs(300));
        let top = aggregator.fetch_leaderboard().await.unwrap().value;
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].artist_name, "Artist 11");
        assert!(top.windows(2).all(|pair| pair[0].streams >= pair[1].streams));
    }

    #[tokio::test]
    async fn empty_warehouse_yields_zeroes() {
        let aggregator =
            MetricsAggregator::new(Arc::new(FakeWarehouse::default()), Duration::from_secs(300));
        assert_eq!(
            aggregator.fetch_overall_metrics().await.unwrap().value,
            MetricsSnapshot::default()
        );
        assert!(aggregator.fetch_leaderboard().await.unwrap().value.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cached_results_are_reused_until_ttl_expires() {
        let fake = Arc::new(FakeWarehouse::with_data());
        let aggregator = MetricsAggregator::new(fake.clone(), Duration::from_secs(300));

        let first = aggregator.fetch_overall_metrics().await.unwrap();
        let calls = fake.calls.load(Ordering::SeqCst);
        assert_eq!(calls, 2);

        tokio::time::advance(Duration::from_secs(299)).await;
        let second = aggregator.fetch_overall_metrics().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.fetched_at, second.fetched_at);
        assert_eq!(fake.calls.load(Ordering::SeqCst), calls);

        tokio::time::advance(Duration::from_secs(2)).await;
        aggregator.fetch_overall_metrics().await.unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), calls + 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let fake = Arc::new(FakeWarehouse::with_data());
        fake.failing.store(true, Ordering::SeqCst);
        let aggregator = MetricsAggregator::new(fake.clone(), Duration::from_secs(300));

        let err = aggregator.fetch_leaderboard().await.unwrap_err();
        assert!(matches!(err, DataSourceError::Connection(_)));

        fake.failing.store(false, Ordering::SeqCst);
        assert_eq!(aggregator.fetch_leaderboard().await.unwrap().value.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_queries_expire_one_ttl_after_they_were_issued() {
        let fake = Arc::new(FakeWarehouse {
            delay: Duration::from_millis(200),
            ..FakeWarehouse::with_data()
        });
        let aggregator = MetricsAggregator::new(fake.clone(), Duration::from_secs(300));

        aggregator.fetch_overall_metrics().await.unwrap();
        assert_eq!(fake.seen_windows.lock().unwrap().len(), 1);

        // 400ms of that went to the query itself
        tokio::time::advance(Duration::from_millis(299_600)).await;
        aggregator.fetch_overall_metrics().await.unwrap();
        assert_eq!(fake.seen_windows.lock().unwrap().len(), 2);
    }
}
