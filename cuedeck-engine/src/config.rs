//! Configuration management
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap**: database path, port, logging — static, read once
//!    at startup, overridable by command-line arguments.
//! 2. **Database runtime**: switcher settings from the `settings` table,
//!    initialized with built-in defaults when missing.

use crate::db;
use crate::error::{Error, Result};
use crate::switcher::done::FrameIndexing;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime; restart to pick up changes.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file (relative or absolute)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("cuedeck.db")
}

fn default_port() -> u16 {
    5750
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Runtime settings loaded from the database
///
/// All values have built-in defaults; NULL or missing database values are
/// initialized and written back for consistency.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Global transition time (seconds) used by sources that opt in
    pub global_transition_time_secs: f64,

    /// Queue switch requests behind an in-flight transition
    pub queue_enabled: bool,

    /// Destructive-operation confirmation gate
    pub safety_enabled: bool,

    /// Frames-remaining off-by-one policy for the done evaluator
    pub frame_indexing: FrameIndexing,
}

impl RuntimeSettings {
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let settings = Self {
            global_transition_time_secs: db::settings::get_global_transition_time(pool).await?,
            queue_enabled: db::settings::get_queue_enabled(pool).await?,
            safety_enabled: db::settings::get_safety(pool).await?,
            frame_indexing: db::settings::get_frame_indexing(pool).await?,
        };
        info!("Loaded runtime settings from database");
        Ok(settings)
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub port: u16,
    pub db_pool: SqlitePool,
    pub runtime: RuntimeSettings,
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub port: Option<u16>,
}

impl Config {
    /// Load complete configuration from TOML (when present) and database.
    ///
    /// Priority: command-line arguments > TOML file > built-in defaults for
    /// bootstrap values; database settings table for runtime values.
    pub async fn load(toml_path: Option<&PathBuf>, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) => {
                let toml_str = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Config(format!("Failed to read config file {:?}: {}", path, e))
                })?;
                let parsed: TomlConfig = toml::from_str(&toml_str)
                    .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
                info!("Loaded TOML configuration from {:?}", path);
                parsed
            }
            None => TomlConfig::default(),
        };

        let database_path = overrides
            .database_path
            .unwrap_or(toml_config.database_path);
        let port = overrides.port.unwrap_or(toml_config.port);

        let db_url = format!("sqlite:{}?mode=rwc", database_path.display());
        let db_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&db_url)
            .await?;
        info!("Connected to database: {:?}", database_path);

        db::init::init_db(&db_pool).await?;
        let runtime = RuntimeSettings::load(&db_pool).await?;

        Ok(Config {
            database_path,
            port,
            db_pool,
            runtime,
        })
    }
}
