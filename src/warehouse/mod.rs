use crate::config::WarehouseConfig;
use crate::errors::DataSourceError;
use crate::models::{LeaderboardEntry, MetricsSnapshot};
use crate::stats::{DateWindow, ReportWindows};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

pub mod keypair;
pub mod snowflake;
pub mod sqlite;

pub use snowflake::SnowflakeWarehouse;
pub use sqlite::SqliteWarehouse;

/// Read-only access to the daily streaming and short-video tables.
#[async_trait]
pub trait Warehouse: Send + Sync {
    fn name(&self) -> &'static str;

    /// Latest activity date in the streaming source; `None` when it is empty.
    async fn latest_activity_date(&self) -> Result<Option<NaiveDate>, DataSourceError>;

    /// Current/previous totals for both report windows.
    async fn window_totals(&self, windows: &ReportWindows) -> Result<MetricsSnapshot, DataSourceError>;

    /// Artists in `window` by summed streams, highest first.
    async fn top_artists(
        &self,
        window: &DateWindow,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, DataSourceError>;
}

pub fn build(config: &WarehouseConfig) -> Result<Arc<dyn Warehouse>, DataSourceError> {
    match config {
        WarehouseConfig::Sqlite(cfg) => Ok(Arc::new(SqliteWarehouse::new(cfg.path.clone()))),
        WarehouseConfig::Snowflake(cfg) => Ok(Arc::new(SnowflakeWarehouse::new(cfg)?)),
    }
}

pub(crate) fn parse_activity_date(raw: &str) -> Result<NaiveDate, DataSourceError> {
    // Snowflake DATE columns come back as days since the epoch.
    if let Ok(days) = raw.parse::<i64>() {
        return NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days)))
            .ok_or_else(|| DataSourceError::query(format!("activity date out of range: {raw}")));
    }
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d")
        .map_err(|err| DataSourceError::query(format!("bad activity date '{raw}': {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_dates_parse_from_text_and_epoch_days() {
        let expected = NaiveDate::from_ymd_opt(2026, 1, 14).unwrap();
        assert_eq!(parse_activity_date("2026-01-14").unwrap(), expected);
        assert_eq!(parse_activity_date("2026-01-14 00:00:00").unwrap(), expected);
        assert_eq!(parse_activity_date("20467").unwrap(), expected);
        assert!(parse_activity_date("yesterday").is_err());
    }
}
