use crate::auth::{Authenticator, SessionStore};
use crate::errors::DataSourceError;
use crate::models::{LeaderboardEntry, MetricsSnapshot};
use crate::scheduler::Refresher;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub title: Arc<str>,
    pub logo: Option<Arc<str>>,
    pub refresh_interval_secs: u64,
    pub authenticator: Arc<Authenticator>,
    pub sessions: Arc<Mutex<SessionStore>>,
    pub refresher: Refresher,
}

impl AppState {
    pub fn new(
        title: impl Into<Arc<str>>,
        logo: Option<String>,
        refresh_interval_secs: u64,
        authenticator: Authenticator,
        sessions: Arc<Mutex<SessionStore>>,
        refresher: Refresher,
    ) -> Self {
        Self {
            title: title.into(),
            logo: logo.map(Arc::from),
            refresh_interval_secs,
            authenticator: Arc::new(authenticator),
            sessions,
            refresher,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedData {
    pub snapshot: MetricsSnapshot,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub fetched_at: DateTime<Local>,
}

/// What the screen shows between refresh cycles.
#[derive(Debug, Clone, Default)]
pub struct DisplayState {
    pub last_good: Option<FetchedData>,
    pub last_error: Option<String>,
    pub completed_cycles: u64,
}

impl DisplayState {
    pub fn record_success(&mut self, data: FetchedData) {
        self.last_good = Some(data);
        self.last_error = None;
        self.completed_cycles += 1;
    }

    /// Keeps the previous data on screen; only the error banner changes.
    pub fn record_failure(&mut self, err: &DataSourceError) {
        self.last_error = Some(err.to_string());
        self.completed_cycles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_keeps_last_good_data() {
        let mut display = DisplayState::default();
        display.record_success(FetchedData {
            snapshot: MetricsSnapshot::default(),
            leaderboard: Vec::new(),
            fetched_at: Local::now(),
        });
        display.record_failure(&DataSourceError::query("timeout"));

        assert!(display.last_good.is_some());
        assert_eq!(display.last_error.as_deref(), Some("warehouse query failed: timeout"));
        assert_eq!(display.completed_cycles, 2);
    }

    #[test]
    fn success_clears_previous_error() {
        let mut display = DisplayState::default();
        display.record_failure(&DataSourceError::connection("refused"));
        display.record_success(FetchedData {
            snapshot: MetricsSnapshot::default(),
            leaderboard: Vec::new(),
            fetched_at: Local::now(),
        });
        assert!(display.last_error.is_none());
    }
}
