use crate::delta::{classify, format_count, format_percent, percent_change};
use crate::models::{
    DashboardView, DeltaView, DisplayStatus, ErrorPanel, KpiCard, LeaderboardEntry,
    LeaderboardRow, MetricsSnapshot, Paired,
};
use crate::state::DisplayState;
use chrono::{Duration, NaiveDate};
use serde::Serialize;

pub const WINDOW_DAYS: i64 = 7;
pub const LEADERBOARD_SIZE: usize = 10;

const ERROR_HINT: &str = "Please check your warehouse connection settings.";

/// Inclusive range of activity dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// The two trailing weeks compared on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportWindows {
    pub reference: NaiveDate,
    pub current: DateWindow,
    pub previous: DateWindow,
}

impl ReportWindows {
    pub fn ending_at(reference: NaiveDate) -> Self {
        let current = DateWindow {
            start: reference - Duration::days(WINDOW_DAYS - 1),
            end: reference,
        };
        let previous = DateWindow {
            start: current.start - Duration::days(WINDOW_DAYS),
            end: current.start - Duration::days(1),
        };
        Self {
            reference,
            current,
            previous,
        }
    }
}

/// Highest streams first, artist name breaking ties, at most ten rows.
pub fn rank_leaderboard(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| {
        b.streams
            .cmp(&a.streams)
            .then_with(|| a.artist_name.cmp(&b.artist_name))
    });
    entries.truncate(LEADERBOARD_SIZE);
    entries
}

pub fn build_dashboard(display: &DisplayState, title: &str, refresh_interval_secs: u64) -> DashboardView {
    let status = match (&display.last_good, &display.last_error) {
        (Some(_), None) => DisplayStatus::Ready,
        (Some(_), Some(_)) => DisplayStatus::Stale,
        (None, Some(_)) => DisplayStatus::Error,
        (None, None) => DisplayStatus::Loading,
    };

    let error = display.last_error.as_ref().map(|message| ErrorPanel {
        message: format!("Error loading data: {message}"),
        hint: ERROR_HINT.to_string(),
    });

    let (subtitle, primary, secondary, leaderboard) = match &display.last_good {
        Some(data) => (
            format!(
                "Last 7 Days • Updated: {}",
                data.fetched_at.format("%B %d, %Y at %I:%M %p")
            ),
            primary_cards(&data.snapshot),
            secondary_cards(&data.snapshot),
            leaderboard_rows(&data.leaderboard),
        ),
        None => (
            "Last 7 Days • Waiting for data".to_string(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ),
    };

    DashboardView {
        title: title.to_string(),
        subtitle,
        status,
        error,
        primary,
        secondary,
        leaderboard,
        refresh_interval_secs,
    }
}

fn primary_cards(snapshot: &MetricsSnapshot) -> Vec<KpiCard> {
    vec![
        card_with_delta("Total Streams", snapshot.streams),
        card_with_delta("Listeners", snapshot.listeners),
        card_with_delta("TikTok Views", snapshot.short_video_views),
        card_with_delta("TikTok Creations", snapshot.short_video_creations),
    ]
}

fn secondary_cards(snapshot: &MetricsSnapshot) -> Vec<KpiCard> {
    vec![
        plain_card("Active Artists", snapshot.active_artists.current),
        plain_card("Active Tracks", snapshot.active_tracks.current),
    ]
}

fn card_with_delta(label: &str, values: Paired) -> KpiCard {
    let ratio = percent_change(values.current, values.previous);
    let direction = classify(values.current, values.previous);
    KpiCard {
        delta: Some(DeltaView {
            direction,
            arrow: direction.arrow().to_string(),
            ratio,
            text: format_percent(ratio),
        }),
        ..plain_card(label, values.current)
    }
}

fn plain_card(label: &str, value: u64) -> KpiCard {
    KpiCard {
        label: label.to_string(),
        value: format_count(value),
        raw_value: value,
        delta: None,
    }
}

fn leaderboard_rows(entries: &[LeaderboardEntry]) -> Vec<LeaderboardRow> {
    entries
        .iter()
        .take(LEADERBOARD_SIZE)
        .enumerate()
        .map(|(idx, entry)| LeaderboardRow {
            rank: idx + 1,
            artist: entry.artist_name.clone(),
            streams: format_count(entry.streams),
            short_video_views: format_count(entry.short_video_views),
        })
        .collect()
}
