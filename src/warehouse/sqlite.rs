use super::{parse_activity_date, Warehouse};
use crate::errors::DataSourceError;
use crate::models::{LeaderboardEntry, MetricsSnapshot, Paired};
use crate::stats::{DateWindow, ReportWindows};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OpenFlags, Row};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Layout of a local warehouse extract. Dates are `YYYY-MM-DD` text.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS track_artist_daily (
    activity_date TEXT NOT NULL,
    artist_id TEXT NOT NULL,
    artist_name TEXT NOT NULL,
    isrc TEXT,
    streams INTEGER NOT NULL DEFAULT 0,
    listeners INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS tiktok_daily (
    activity_date TEXT NOT NULL,
    artist_id TEXT NOT NULL,
    artist_name TEXT NOT NULL,
    isrc TEXT NOT NULL,
    video_views INTEGER NOT NULL DEFAULT 0,
    creations INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS track_artist_daily_date ON track_artist_daily (activity_date);
CREATE INDEX IF NOT EXISTS tiktok_daily_date ON tiktok_daily (activity_date);
";

const LATEST_DATE_SQL: &str = "SELECT MAX(activity_date) FROM track_artist_daily";

// ?1 previous.start, ?2 previous.end, ?3 current.start, ?4 current.end
const TOTALS_SQL: &str = "
WITH streams AS (
    SELECT activity_date, artist_id,
           SUM(streams) AS streams, SUM(listeners) AS listeners
    FROM track_artist_daily
    WHERE activity_date BETWEEN ?1 AND ?4
    GROUP BY activity_date, artist_id
),
tiktok AS (
    SELECT activity_date, artist_id,
           SUM(video_views) AS views, SUM(creations) AS creations
    FROM tiktok_daily
    WHERE activity_date BETWEEN ?1 AND ?4
    GROUP BY activity_date, artist_id
),
base AS (
    SELECT s.activity_date AS activity_date, s.artist_id AS artist_id,
           s.streams AS streams, s.listeners AS listeners,
           COALESCE(t.views, 0) AS views, COALESCE(t.creations, 0) AS creations
    FROM streams s
    LEFT JOIN tiktok t
      ON t.activity_date = s.activity_date AND t.artist_id = s.artist_id
),
tracks AS (
    SELECT DISTINCT t.activity_date AS activity_date, t.isrc AS isrc
    FROM tiktok_daily t
    JOIN streams s
      ON s.activity_date = t.activity_date AND s.artist_id = t.artist_id
)
SELECT
    COALESCE(SUM(CASE WHEN activity_date >= ?3 THEN streams END), 0),
    COALESCE(SUM(CASE WHEN activity_date <= ?2 THEN streams END), 0),
    COALESCE(SUM(CASE WHEN activity_date >= ?3 THEN listeners END), 0),
    COALESCE(SUM(CASE WHEN activity_date <= ?2 THEN listeners END), 0),
    COUNT(DISTINCT CASE WHEN activity_date >= ?3 THEN artist_id END),
    COUNT(DISTINCT CASE WHEN activity_date <= ?2 THEN artist_id END),
    (SELECT COUNT(DISTINCT isrc) FROM tracks WHERE activity_date >= ?3),
    (SELECT COUNT(DISTINCT isrc) FROM tracks WHERE activity_date <= ?2),
    COALESCE(SUM(CASE WHEN activity_date >= ?3 THEN views END), 0),
    COALESCE(SUM(CASE WHEN activity_date <= ?2 THEN views END), 0),
    COALESCE(SUM(CASE WHEN activity_date >= ?3 THEN creations END), 0),
    COALESCE(SUM(CASE WHEN activity_date <= ?2 THEN creations END), 0)
FROM base
";

// ?1 window.start, ?2 window.end, ?3 limit
const LEADERBOARD_SQL: &str = "
WITH streams AS (
    SELECT activity_date, artist_id, MIN(artist_name) AS artist_name,
           SUM(streams) AS streams
    FROM track_artist_daily
    WHERE activity_date BETWEEN ?1 AND ?2
    GROUP BY activity_date, artist_id
),
tiktok AS (
    SELECT activity_date, artist_id, SUM(video_views) AS views
    FROM tiktok_daily
    WHERE activity_date BETWEEN ?1 AND ?2
    GROUP BY activity_date, artist_id
)
SELECT MIN(s.artist_name) AS artist_name,
       SUM(s.streams) AS total_streams,
       COALESCE(SUM(t.views), 0) AS total_views
FROM streams s
LEFT JOIN tiktok t
  ON t.activity_date = s.activity_date AND t.artist_id = s.artist_id
GROUP BY s.artist_id
ORDER BY total_streams DESC, artist_name ASC
LIMIT ?3
";

/// A warehouse extract in a local SQLite file, opened read-only.
///
/// The connection is opened on first use and kept between refresh cycles.
/// Any failure drops it so the next cycle starts from a fresh handle.
pub struct SqliteWarehouse {
    path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteWarehouse {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    async fn with_connection<T, F>(&self, query: F) -> Result<T, DataSourceError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let slot = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| DataSourceError::connection("sqlite connection lock poisoned"))?;
            if guard.is_none() {
                debug!("opening sqlite warehouse {}", path.display());
                let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                    .map_err(|err| {
                        DataSourceError::connection(format!("{}: {err}", path.display()))
                    })?;
                *guard = Some(conn);
            }
            let Some(conn) = guard.as_ref() else {
                return Err(DataSourceError::connection("sqlite connection unavailable"));
            };
            match query(conn) {
                Ok(value) => Ok(value),
                Err(err) => {
                    warn!("sqlite query failed, dropping connection: {err}");
                    *guard = None;
                    Err(DataSourceError::query(err))
                }
            }
        })
        .await
        .map_err(DataSourceError::query)?
    }
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn latest_activity_date(&self) -> Result<Option<NaiveDate>, DataSourceError> {
        let raw: Option<String> = self
            .with_connection(|conn| conn.query_row(LATEST_DATE_SQL, [], |row| row.get(0)))
            .await?;
        raw.as_deref().map(parse_activity_date).transpose()
    }

    async fn window_totals(&self, windows: &ReportWindows) -> Result<MetricsSnapshot, DataSourceError> {
        let bounds = [
            windows.previous.start.to_string(),
            windows.previous.end.to_string(),
            windows.current.start.to_string(),
            windows.current.end.to_string(),
        ];
        let reference = windows.reference;
        self.with_connection(move |conn| {
            conn.query_row(TOTALS_SQL, params![bounds[0], bounds[1], bounds[2], bounds[3]], |row| {
                Ok(MetricsSnapshot {
                    reference_date: Some(reference),
                    streams: paired(row, 0)?,
                    listeners: paired(row, 2)?,
                    active_artists: paired(row, 4)?,
                    active_tracks: paired(row, 6)?,
                    short_video_views: paired(row, 8)?,
                    short_video_creations: paired(row, 10)?,
                })
            })
        })
        .await
    }

    async fn top_artists(
        &self,
        window: &DateWindow,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, DataSourceError> {
        let start = window.start.to_string();
        let end = window.end.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(LEADERBOARD_SQL)?;
            let rows = stmt.query_map(params![start, end, limit], |row| {
                Ok(LeaderboardEntry {
                    artist_name: row.get(0)?,
                    streams: count(row, 1)?,
                    short_video_views: count(row, 2)?,
                })
            })?;
            let entries = rows.collect::<rusqlite::Result<Vec<_>>>();
            entries
        })
        .await
    }
}

fn count(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: Option<i64> = row.get(idx)?;
    Ok(value.unwrap_or(0).max(0) as u64)
}

fn paired(row: &Row<'_>, idx: usize) -> rusqlite::Result<Paired> {
    Ok(Paired::new(count(row, idx)?, count(row, idx + 1)?))
}
