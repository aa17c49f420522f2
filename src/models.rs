use crate::delta::Direction;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Paired {
    pub current: u64,
    pub previous: u64,
}

impl Paired {
    pub fn new(current: u64, previous: u64) -> Self {
        Self { current, previous }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub reference_date: Option<NaiveDate>,
    pub streams: Paired,
    pub listeners: Paired,
    pub active_artists: Paired,
    pub active_tracks: Paired,
    pub short_video_views: Paired,
    pub short_video_creations: Paired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub artist_name: String,
    pub streams: u64,
    pub short_video_views: u64,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Loading,
    Ready,
    Stale,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeltaView {
    pub direction: Direction,
    pub arrow: String,
    pub ratio: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiCard {
    pub label: String,
    pub value: String,
    pub raw_value: u64,
    pub delta: Option<DeltaView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub artist: String,
    pub streams: String,
    pub short_video_views: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPanel {
    pub message: String,
    pub hint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardView {
    pub title: String,
    pub subtitle: String,
    pub status: DisplayStatus,
    pub error: Option<ErrorPanel>,
    pub primary: Vec<KpiCard>,
    pub secondary: Vec<KpiCard>,
    pub leaderboard: Vec<LeaderboardRow>,
    pub refresh_interval_secs: u64,
}
