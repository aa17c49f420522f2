use crate::auth::SessionStore;
use crate::errors::DataSourceError;
use crate::metrics::MetricsAggregator;
use crate::state::{DisplayState, FetchedData};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Refreshed,
    Failed,
    /// Another cycle was already running.
    Skipped,
}

/// Runs fetch cycles and owns what the display currently shows.
///
/// Cycles never overlap. Scheduled cycles queue behind a running one;
/// manual triggers are dropped instead.
#[derive(Clone)]
pub struct Refresher {
    aggregator: Arc<MetricsAggregator>,
    display: Arc<RwLock<DisplayState>>,
    sessions: Arc<Mutex<SessionStore>>,
    cycle_lock: Arc<Mutex<()>>,
}

impl Refresher {
    pub fn new(aggregator: Arc<MetricsAggregator>, sessions: Arc<Mutex<SessionStore>>) -> Self {
        Self {
            aggregator,
            display: Arc::new(RwLock::new(DisplayState::default())),
            sessions,
            cycle_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = self.cycle_lock.lock().await;
        self.cycle().await
    }

    pub async fn try_run_cycle(&self) -> CycleOutcome {
        match self.cycle_lock.try_lock() {
            Ok(_guard) => self.cycle().await,
            Err(_) => {
                debug!("refresh already in progress, skipping trigger");
                CycleOutcome::Skipped
            }
        }
    }

    /// Waits for the first cycle if nothing has completed yet.
    pub async fn ensure_loaded(&self) {
        if self.display.read().await.completed_cycles > 0 {
            return;
        }
        let _guard = self.cycle_lock.lock().await;
        if self.display.read().await.completed_cycles == 0 {
            self.cycle().await;
        }
    }

    pub async fn display(&self) -> DisplayState {
        self.display.read().await.clone()
    }

    async fn cycle(&self) -> CycleOutcome {
        self.sessions.lock().await.prune();

        let result = self.fetch().await;
        let mut shown = self.display.write().await;
        match result {
            Ok(data) => {
                info!(
                    artists = data.leaderboard.len(),
                    reference = ?data.snapshot.reference_date,
                    fetched_at = %data.fetched_at,
                    cycle = shown.completed_cycles + 1,
                    "dashboard refreshed"
                );
                shown.record_success(data);
                CycleOutcome::Refreshed
            }
            Err(err) => {
                warn!("dashboard refresh failed: {err}");
                shown.record_failure(&err);
                CycleOutcome::Failed
            }
        }
    }

    /// Both queries go out together. The result is as old as the older of
    /// the two, which is a cached one whenever the TTL has not run out.
    async fn fetch(&self) -> Result<FetchedData, DataSourceError> {
        let (overall, leaderboard) = tokio::join!(
            self.aggregator.fetch_overall_metrics(),
            self.aggregator.fetch_leaderboard()
        );
        let (overall, leaderboard) = (overall?, leaderboard?);
        Ok(FetchedData {
            fetched_at: overall.fetched_at.min(leaderboard.fetched_at),
            snapshot: overall.value,
            leaderboard: leaderboard.value,
        })
    }
}

/// Fires a refresh cycle on a fixed cadence in the background.
///
/// The first tick fires immediately. Ticks missed while a cycle overran or
/// the process was suspended are not replayed; the next one fires a full
/// interval after the late tick.
pub struct RefreshScheduler {
    refresher: Refresher,
    period: Duration,
}

impl RefreshScheduler {
    pub fn new(refresher: Refresher, period: Duration) -> Self {
        Self { refresher, period }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(period_secs = self.period.as_secs(), "refresh scheduler started");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let outcome = self.refresher.run_cycle().await;
            debug!(?outcome, "scheduled refresh finished");
        }
    }
}
