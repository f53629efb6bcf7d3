//! Configuration file parser for the PaperSorter core.
//!
//! The config file is a single TOML document with sections `{db,
//! embedding_api, scoring, notification, smtp, feed_defaults, retention,
//! scheduler}`. A missing file is an error at startup, since the core
//! cannot run without `db` credentials; every other section falls back
//! to documented defaults via `#[serde(default)]`.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("config file too large: {0} bytes (max {1})")]
    TooLarge(u64, u64),
}

const MAX_FILE_SIZE: u64 = 1_048_576;

#[derive(Clone, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub database: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            user: "papersorter".into(),
            password: SecretString::from(String::new()),
            database: "papersorter".into(),
        }
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

impl DbConfig {
    /// Build a `postgres://` connection URL. The password is only exposed
    /// here, at the point of use, never via `Debug`.
    pub fn connect_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.database
        )
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingApiConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub dimensions: usize,
    /// Max articles embedded per batch request.
    pub batch_size: usize,
    /// Characters allowed in the embedding input text before truncation.
    pub char_budget: usize,
}

impl Default for EmbeddingApiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/embeddings".into(),
            api_key: SecretString::from(String::new()),
            model: "text-embedding-3-small".into(),
            dimensions: 1536,
            batch_size: 64,
            char_budget: 8000,
        }
    }
}

impl std::fmt::Debug for EmbeddingApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingApiConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .field("char_budget", &self.char_budget)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub model_dir: String,
    /// Batch size for scoring passes.
    pub batch_size: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            model_dir: "./models".into(),
            batch_size: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub global_rate_per_sec: f64,
    pub global_burst: u32,
    /// Global cap on entries claimed per channel per dispatch tick,
    /// independent of each channel's own `broadcast_limit`.
    pub global_claim_cap: i64,
    /// Base URL the feedback buttons/links embedded in a notification
    /// point back at.
    pub feedback_base_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            global_rate_per_sec: 1.0,
            global_burst: 5,
            global_claim_cap: 100,
            feedback_base_url: "https://papersorter.local".into(),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub encryption: SmtpEncryption,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            encryption: SmtpEncryption::StartTls,
            username: String::new(),
            password: SecretString::from(String::new()),
            from_address: "papersorter@localhost".into(),
        }
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encryption", &self.encryption)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmtpEncryption {
    None,
    StartTls,
    Tls,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedDefaultsConfig {
    pub check_interval_hours: u32,
    pub ssl_verify: bool,
    /// Workers processing feed sources concurrently.
    pub workers: usize,
    /// Dedup fuzzy-title window in days.
    pub dedup_window_days: i64,
    /// Dedup fuzzy-title similarity threshold.
    pub dedup_threshold: f64,
}

impl Default for FeedDefaultsConfig {
    fn default() -> Self {
        Self {
            check_interval_hours: 1,
            ssl_verify: true,
            workers: 8,
            dedup_window_days: 30,
            dedup_threshold: 0.92,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub broadcast_days: i64,
    pub queue_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            broadcast_days: 30,
            queue_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub update_cron: String,
    pub broadcast_cron: String,
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_cron: "3h".into(),
            broadcast_cron: "1h".into(),
            workers: 4,
        }
    }
}

/// Top-level application configuration, parsed once at startup and passed
/// by reference to every component (Design Notes §9: "configuration as a
/// struct").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub embedding_api: EmbeddingApiConfig,
    pub scoring: ScoringConfig,
    pub notification: NotificationConfig,
    pub smtp: SmtpConfig,
    pub feed_defaults: FeedDefaultsConfig,
    pub retention: RetentionConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            embedding_api: EmbeddingApiConfig::default(),
            scoring: ScoringConfig::default(),
            notification: NotificationConfig::default(),
            smtp: SmtpConfig::default(),
            feed_defaults: FeedDefaultsConfig::default(),
            retention: RetentionConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(meta.len(), MAX_FILE_SIZE));
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::warn!(path = %path.display(), "config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "db",
                "embedding_api",
                "scoring",
                "notification",
                "smtp",
                "feed_defaults",
                "retention",
                "scheduler",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "unknown top-level key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_dimensions() {
        let config = Config::default();
        assert_eq!(config.embedding_api.dimensions, 1536);
        assert_eq!(config.feed_defaults.dedup_window_days, 30);
        assert!((config.feed_defaults.dedup_threshold - 0.92).abs() < f64::EPSILON);
        assert!(config.feed_defaults.ssl_verify);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = Path::new("/tmp/papersorter_test_nonexistent_config.toml");
        assert!(Config::load(path).is_err());
    }

    #[test]
    fn partial_config_uses_defaults_for_missing_sections() {
        let dir = std::env::temp_dir().join("papersorter_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            "[db]\nhost = \"dbhost\"\nport = 5433\nuser = \"u\"\npassword = \"p\"\ndatabase = \"d\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.db.host, "dbhost");
        assert_eq!(config.scheduler.update_cron, "3h"); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn debug_masks_secrets() {
        let config = Config::default();
        let out = format!("{:?}", config.db);
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains(&config.db.password.expose_secret().to_string()));
    }
}
