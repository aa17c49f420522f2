//! Settings from `dashboard.toml` (or `DASHBOARD_CONFIG`), then env overrides.

use serde::Deserialize;
use std::{env, fmt::Display, path::Path, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PASSWORD: &str = "alta2024";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("snowflake warehouse needs one of 'password', 'private_key' or 'private_key_path'")]
    MissingSnowflakeCredential,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: u16,
    pub title: String,
    pub dashboard_password: String,
    pub tv_token: Option<String>,
    pub refresh_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub session_idle_secs: u64,
    pub logo_path: Option<PathBuf>,
    pub warehouse: WarehouseConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            title: "ALTA MUSIC GROUP".to_string(),
            dashboard_password: DEFAULT_PASSWORD.to_string(),
            tv_token: None,
            refresh_interval_secs: 300,
            cache_ttl_secs: 300,
            session_idle_secs: 7 * 24 * 60 * 60,
            logo_path: Some(PathBuf::from("assets/logo.png")),
            warehouse: WarehouseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WarehouseConfig {
    Sqlite(SqliteConfig),
    Snowflake(SnowflakeConfig),
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        WarehouseConfig::Sqlite(SqliteConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/warehouse.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeConfig {
    pub account: String,
    pub user: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: Option<String>,
    /// Programmatic access token, sent as a bearer credential.
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub private_key_passphrase: Option<String>,
    /// Defaults to `https://{account}.snowflakecomputing.com`.
    pub base_url: Option<String>,
    #[serde(default = "default_streams_table")]
    pub streams_table: String,
    #[serde(default = "default_short_video_table")]
    pub short_video_table: String,
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

fn default_streams_table() -> String {
    "STAGE_PROD.STREAMING.ORCHARD_TRACK_ARTIST_DAILY".to_string()
}

fn default_short_video_table() -> String {
    "STAGE_PROD.SOCIALS.ORCHARD_TIKTOK_DAILY".to_string()
}

fn default_statement_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnowflakeAuth {
    Token(String),
    KeyPair {
        pem: String,
        passphrase: Option<String>,
    },
}

impl SnowflakeConfig {
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.account.to_lowercase()),
        }
    }

    /// Key material wins over a token when both are configured.
    pub fn auth(&self) -> Result<SnowflakeAuth, ConfigError> {
        let pem = match (&self.private_key, &self.private_key_path) {
            (Some(pem), _) => Some(pem.clone()),
            (None, Some(path)) => Some(std::fs::read_to_string(path).map_err(|source| {
                ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                }
            })?),
            (None, None) => None,
        };

        match (pem, &self.password) {
            (Some(pem), _) => Ok(SnowflakeAuth::KeyPair {
                pem,
                passphrase: self.private_key_passphrase.clone(),
            }),
            (None, Some(token)) => Ok(SnowflakeAuth::Token(token.clone())),
            (None, None) => Err(ConfigError::MissingSnowflakeCredential),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("DASHBOARD_CONFIG").unwrap_or_else(|_| "dashboard.toml".to_string());
        let mut settings = Self::from_file(Path::new(&path))?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("{} not found, using default settings", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(port) = parse_var("PORT")? {
            self.port = port;
        }
        if let Ok(password) = env::var("DASHBOARD_PASSWORD") {
            self.dashboard_password = password;
        }
        if let Ok(token) = env::var("DASHBOARD_TV_TOKEN") {
            self.tv_token = Some(token);
        }
        if let Ok(path) = env::var("DASHBOARD_SQLITE_PATH") {
            self.warehouse = WarehouseConfig::Sqlite(SqliteConfig { path: path.into() });
        }
        if let Ok(path) = env::var("DASHBOARD_LOGO_PATH") {
            self.logo_path = Some(path.into());
        }
        if let Some(secs) = parse_var("DASHBOARD_REFRESH_SECS")? {
            self.refresh_interval_secs = secs;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.dashboard_password.is_empty() {
            warn!("dashboard_password is empty, falling back to the default password");
            self.dashboard_password = DEFAULT_PASSWORD.to_string();
        }
        if self.tv_token.as_deref().is_some_and(str::is_empty) {
            self.tv_token = None;
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "refresh_interval_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if let WarehouseConfig::Snowflake(cfg) = &self.warehouse {
            if cfg.password.is_none() && cfg.private_key.is_none() && cfg.private_key_path.is_none() {
                return Err(ConfigError::MissingSnowflakeCredential);
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|err: T::Err| ConfigError::InvalidValue {
                key,
                message: err.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
