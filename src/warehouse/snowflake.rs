use super::keypair::KeyPairSigner;
use super::{parse_activity_date, Warehouse};
use crate::config::{SnowflakeAuth, SnowflakeConfig};
use crate::errors::DataSourceError;
use crate::models::{LeaderboardEntry, MetricsSnapshot, Paired};
use crate::stats::{DateWindow, ReportWindows};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

type Rows = Vec<Vec<Option<String>>>;

enum Credential {
    Token(String),
    KeyPair(KeyPairSigner),
}

impl Credential {
    fn token_type(&self) -> &'static str {
        match self {
            Credential::Token(_) => "PROGRAMMATIC_ACCESS_TOKEN",
            Credential::KeyPair(_) => "KEYPAIR_JWT",
        }
    }

    fn bearer(&self) -> Result<String, DataSourceError> {
        match self {
            Credential::Token(token) => Ok(token.clone()),
            Credential::KeyPair(signer) => signer.token(Utc::now()),
        }
    }
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    warehouse: &'a str,
    database: &'a str,
    schema: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    message: Option<String>,
    statement_handle: Option<String>,
    // First partition only; these queries return one row or ten.
    #[serde(default)]
    data: Rows,
}

/// Snowflake over the SQL REST API (`/api/v2/statements`).
pub struct SnowflakeWarehouse {
    client: Client,
    base_url: String,
    credential: Credential,
    warehouse: String,
    database: String,
    schema: String,
    role: Option<String>,
    streams_table: String,
    short_video_table: String,
    statement_timeout: Duration,
}

impl SnowflakeWarehouse {
    pub fn new(config: &SnowflakeConfig) -> Result<Self, DataSourceError> {
        let auth = config.auth().map_err(DataSourceError::connection)?;
        let credential = match auth {
            SnowflakeAuth::Token(token) => Credential::Token(token),
            SnowflakeAuth::KeyPair { pem, passphrase } => Credential::KeyPair(KeyPairSigner::from_pem(
                &config.account,
                &config.user,
                &pem,
                passphrase.as_deref(),
            )?),
        };
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DataSourceError::connection)?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            credential,
            warehouse: config.warehouse.clone(),
            database: config.database.clone(),
            schema: config.schema.clone(),
            role: config.role.clone(),
            streams_table: config.streams_table.clone(),
            short_video_table: config.short_video_table.clone(),
            statement_timeout: Duration::from_secs(config.statement_timeout_secs),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, DataSourceError> {
        Ok(request
            .bearer_auth(self.credential.bearer()?)
            .header("X-Snowflake-Authorization-Token-Type", self.credential.token_type())
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    async fn execute(&self, statement: &str) -> Result<Rows, DataSourceError> {
        let body = StatementRequest {
            statement,
            timeout: self.statement_timeout.as_secs(),
            warehouse: &self.warehouse,
            database: &self.database,
            schema: &self.schema,
            role: self.role.as_deref(),
        };
        let url = format!("{}/api/v2/statements", self.base_url);
        let mut response = self
            .authorized(self.client.post(&url))?
            .json(&body)
            .send()
            .await
            .map_err(DataSourceError::connection)?;

        let deadline = Instant::now() + self.statement_timeout;
        loop {
            match response.status() {
                StatusCode::OK => {
                    let body: StatementResponse =
                        response.json().await.map_err(DataSourceError::query)?;
                    return Ok(body.data);
                }
                StatusCode::ACCEPTED => {
                    let body: StatementResponse =
                        response.json().await.map_err(DataSourceError::query)?;
                    let handle = body.statement_handle.ok_or_else(|| {
                        DataSourceError::query("statement accepted without a handle")
                    })?;
                    if Instant::now() >= deadline {
                        return Err(DataSourceError::query(format!(
                            "statement {handle} still running after {}s",
                            self.statement_timeout.as_secs()
                        )));
                    }
                    debug!(%handle, "statement still running");
                    sleep(POLL_INTERVAL).await;
                    let status_url = format!("{}/api/v2/statements/{handle}", self.base_url);
                    response = self
                        .authorized(self.client.get(&status_url))?
                        .send()
                        .await
                        .map_err(DataSourceError::connection)?;
                }
                _ => return Err(failure(response).await),
            }
        }
    }

    fn totals_sql(&self, windows: &ReportWindows) -> String {
        // Date literals come from `NaiveDate`, never from user input.
        let (p_start, p_end) = (windows.previous.start, windows.previous.end);
        let (c_start, c_end) = (windows.current.start, windows.current.end);
        format!(
            "WITH streams AS (
    SELECT activity_date, artist_id, SUM(streams) AS streams, SUM(listeners) AS listeners
    FROM {streams_table}
    WHERE activity_date BETWEEN '{p_start}'::DATE AND '{c_end}'::DATE
    GROUP BY activity_date, artist_id
),
tiktok AS (
    SELECT activity_date, artist_id, SUM(video_views) AS views, SUM(creations) AS creations
    FROM {short_video_table}
    WHERE activity_date BETWEEN '{p_start}'::DATE AND '{c_end}'::DATE
    GROUP BY activity_date, artist_id
),
base AS (
    SELECT s.activity_date, s.artist_id, s.streams, s.listeners,
           COALESCE(t.views, 0) AS views, COALESCE(t.creations, 0) AS creations
    FROM streams s
    LEFT JOIN tiktok t ON t.activity_date = s.activity_date AND t.artist_id = s.artist_id
),
tracks AS (
    SELECT DISTINCT t.activity_date, t.isrc
    FROM {short_video_table} t
    JOIN streams s ON s.activity_date = t.activity_date AND s.artist_id = t.artist_id
)
SELECT
    COALESCE(SUM(IFF(activity_date >= '{c_start}'::DATE, streams, 0)), 0),
    COALESCE(SUM(IFF(activity_date <= '{p_end}'::DATE, streams, 0)), 0),
    COALESCE(SUM(IFF(activity_date >= '{c_start}'::DATE, listeners, 0)), 0),
    COALESCE(SUM(IFF(activity_date <= '{p_end}'::DATE, listeners, 0)), 0),
    COUNT(DISTINCT IFF(activity_date >= '{c_start}'::DATE, artist_id, NULL)),
    COUNT(DISTINCT IFF(activity_date <= '{p_end}'::DATE, artist_id, NULL)),
    (SELECT COUNT(DISTINCT isrc) FROM tracks WHERE activity_date >= '{c_start}'::DATE),
    (SELECT COUNT(DISTINCT isrc) FROM tracks WHERE activity_date <= '{p_end}'::DATE),
    COALESCE(SUM(IFF(activity_date >= '{c_start}'::DATE, views, 0)), 0),
    COALESCE(SUM(IFF(activity_date <= '{p_end}'::DATE, views, 0)), 0),
    COALESCE(SUM(IFF(activity_date >= '{c_start}'::DATE, creations, 0)), 0),
    COALESCE(SUM(IFF(activity_date <= '{p_end}'::DATE, creations, 0)), 0)
FROM base",
            streams_table = self.streams_table,
            short_video_table = self.short_video_table,
        )
    }

    fn leaderboard_sql(&self, window: &DateWindow, limit: usize) -> String {
        let (start, end) = (window.start, window.end);
        format!(
            "WITH streams AS (
    SELECT activity_date, artist_id, MIN(artist_name) AS artist_name, SUM(streams) AS streams
    FROM {streams_table}
    WHERE activity_date BETWEEN '{start}'::DATE AND '{end}'::DATE
    GROUP BY activity_date, artist_id
),
tiktok AS (
    SELECT activity_date, artist_id, SUM(video_views) AS views
    FROM {short_video_table}
    WHERE activity_date BETWEEN '{start}'::DATE AND '{end}'::DATE
    GROUP BY activity_date, artist_id
)
SELECT MIN(s.artist_name) AS artist_name,
       SUM(s.streams) AS total_streams,
       COALESCE(SUM(t.views), 0) AS total_views
FROM streams s
LEFT JOIN tiktok t ON t.activity_date = s.activity_date AND t.artist_id = s.artist_id
GROUP BY s.artist_id
ORDER BY total_streams DESC, artist_name ASC
LIMIT {limit}",
            streams_table = self.streams_table,
            short_video_table = self.short_video_table,
        )
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    async fn latest_activity_date(&self) -> Result<Option<NaiveDate>, DataSourceError> {
        let sql = format!(
            "SELECT TO_VARCHAR(MAX(activity_date), 'YYYY-MM-DD') FROM {}",
            self.streams_table
        );
        let rows = self.execute(&sql).await?;
        match rows.first().and_then(|row| row.first()).cloned().flatten() {
            Some(raw) => parse_activity_date(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn window_totals(&self, windows: &ReportWindows) -> Result<MetricsSnapshot, DataSourceError> {
        let rows = self.execute(&self.totals_sql(windows)).await?;
        let row = rows
            .first()
            .ok_or_else(|| DataSourceError::query("totals query returned no rows"))?;
        let pair = |idx: usize| -> Result<Paired, DataSourceError> {
            Ok(Paired::new(cell_u64(row, idx)?, cell_u64(row, idx + 1)?))
        };
        Ok(MetricsSnapshot {
            reference_date: Some(windows.reference),
            streams: pair(0)?,
            listeners: pair(2)?,
            active_artists: pair(4)?,
            active_tracks: pair(6)?,
            short_video_views: pair(8)?,
            short_video_creations: pair(10)?,
        })
    }

    async fn top_artists(
        &self,
        window: &DateWindow,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, DataSourceError> {
        let rows = self.execute(&self.leaderboard_sql(window, limit)).await?;
        rows.iter()
            .map(|row| {
                Ok(LeaderboardEntry {
                    artist_name: row.first().cloned().flatten().unwrap_or_default(),
                    streams: cell_u64(row, 1)?,
                    short_video_views: cell_u64(row, 2)?,
                })
            })
            .collect()
    }
}

async fn failure(response: Response) -> DataSourceError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<StatementResponse>(&text)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or(text);
    warn!(%status, "snowflake statement failed: {message}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DataSourceError::connection(format!("{status}: {message}"))
        }
        _ => DataSourceError::query(format!("{status}: {message}")),
    }
}

/// Numbers arrive as strings; NULL sums count as zero.
fn cell_u64(row: &[Option<String>], idx: usize) -> Result<u64, DataSourceError> {
    let Some(Some(raw)) = row.get(idx) else {
        return Ok(0);
    };
    if let Ok(value) = raw.parse::<u64>() {
        return Ok(value);
    }
    raw.parse::<f64>()
        .map(|value| value.max(0.0).round() as u64)
        .map_err(|_| DataSourceError::query(format!("column {idx} is not a number: {raw}")))
}
