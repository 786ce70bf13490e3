//! Configuration loading for the showcase catalogue.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `SHOWCASE_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage backend used to persist repositories and technology counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded SQLite database managed through SeaORM.
    Sqlite,
    /// Deta Base item store.
    Deta,
    /// Firestore document store.
    Firestore,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Deta => "deta",
            BackendKind::Firestore => "firestore",
        }
    }

    pub fn is_cloud(&self) -> bool {
        !matches!(self, BackendKind::Sqlite)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "local" => Ok(BackendKind::Sqlite),
            "deta" => Ok(BackendKind::Deta),
            "firestore" | "firebase" => Ok(BackendKind::Firestore),
            other => Err(ConfigError::UnknownBackend {
                value: other.to_string(),
            }),
        }
    }
}

/// Application configuration derived from `SHOWCASE_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deta_project_key: Option<String>,
    #[serde(default = "default_deta_api_base")]
    pub deta_api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firestore_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firestore_access_token: Option<String>,
    #[serde(default = "default_firestore_api_base")]
    pub firestore_api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
    #[serde(default = "default_commit_limit")]
    pub commit_limit: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Write retry parameters for the embedded SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetryConfig {
    /// Total attempts including the first one (default: 5)
    ///
    /// Environment variable: `SHOWCASE_RETRY_MAX_ATTEMPTS`
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds (default: 1000)
    ///
    /// Environment variable: `SHOWCASE_RETRY_INITIAL_DELAY_MS`
    #[serde(default = "default_retry_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after each failed attempt (default: 1.5)
    ///
    /// Environment variable: `SHOWCASE_RETRY_MULTIPLIER`
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            initial_delay_ms: default_retry_initial_delay_ms(),
            multiplier: default_retry_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Validate retry bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(ConfigError::InvalidRetryAttempts {
                value: self.max_attempts,
            });
        }

        if self.initial_delay_ms > 60_000 {
            return Err(ConfigError::InvalidRetryDelay {
                value: self.initial_delay_ms,
            });
        }

        if !(1.0..=10.0).contains(&self.multiplier) {
            return Err(ConfigError::InvalidRetryMultiplier {
                value: self.multiplier,
            });
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            backend: default_backend(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            deta_project_key: None,
            deta_api_base: default_deta_api_base(),
            firestore_project_id: None,
            firestore_access_token: None,
            firestore_api_base: default_firestore_api_base(),
            github_token: None,
            github_api_base: default_github_api_base(),
            commit_limit: default_commit_limit(),
            retry: RetryConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.deta_project_key.is_some() {
            config.deta_project_key = Some("[REDACTED]".to_string());
        }
        if config.firestore_access_token.is_some() {
            config.firestore_access_token = Some("[REDACTED]".to_string());
        }
        if config.github_token.is_some() {
            config.github_token = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            BackendKind::Sqlite => {
                if !self.database_url.starts_with("sqlite:") {
                    return Err(ConfigError::InvalidDatabaseUrl {
                        value: self.database_url.clone(),
                    });
                }
            }
            BackendKind::Deta => match self.deta_project_key.as_deref() {
                None | Some("") => return Err(ConfigError::MissingDetaProjectKey),
                Some(key) if !key.contains('_') => {
                    return Err(ConfigError::InvalidDetaProjectKey);
                }
                Some(_) => {}
            },
            BackendKind::Firestore => {
                if self
                    .firestore_project_id
                    .as_deref()
                    .is_none_or(str::is_empty)
                {
                    return Err(ConfigError::MissingFirestoreProjectId);
                }
                if self
                    .firestore_access_token
                    .as_deref()
                    .is_none_or(str::is_empty)
                {
                    return Err(ConfigError::MissingFirestoreAccessToken);
                }
            }
        }

        if self.commit_limit == 0 || self.commit_limit > 100 {
            return Err(ConfigError::InvalidCommitLimit {
                value: self.commit_limit,
            });
        }

        self.retry.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::Sqlite
}

fn default_database_url() -> String {
    "sqlite://github_projects.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

fn default_db_acquire_timeout_ms() -> u64 {
    20_000 // matches the SQLite lock timeout
}

fn default_deta_api_base() -> String {
    "https://database.deta.sh/v1".to_string()
}

fn default_firestore_api_base() -> String {
    "https://firestore.googleapis.com".to_string()
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_commit_limit() -> usize {
    5
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_initial_delay_ms() -> u64 {
    1000
}

fn default_retry_multiplier() -> f64 {
    1.5
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("unknown storage backend '{value}'; expected sqlite, deta or firestore")]
    UnknownBackend { value: String },
    #[error("database url must use the sqlite scheme, got '{value}'")]
    InvalidDatabaseUrl { value: String },
    #[error("Deta project key is missing; set SHOWCASE_DETA_PROJECT_KEY")]
    MissingDetaProjectKey,
    #[error("Deta project key must have the form <project_id>_<secret>")]
    InvalidDetaProjectKey,
    #[error("Firestore project id is missing; set SHOWCASE_FIRESTORE_PROJECT_ID")]
    MissingFirestoreProjectId,
    #[error("Firestore access token is missing; set SHOWCASE_FIRESTORE_ACCESS_TOKEN")]
    MissingFirestoreAccessToken,
    #[error("commit limit must be between 1 and 100, got {value}")]
    InvalidCommitLimit { value: usize },
    #[error("retry max attempts must be between 1 and 10, got {value}")]
    InvalidRetryAttempts { value: u32 },
    #[error("retry initial delay must not exceed 60000 ms, got {value}")]
    InvalidRetryDelay { value: u64 },
    #[error("retry multiplier must be between 1.0 and 10.0, got {value}")]
    InvalidRetryMultiplier { value: f64 },
}

pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates the configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration without validating it, so callers can apply
    /// overrides (such as a command line backend) before validation.
    pub fn load_unvalidated(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("SHOWCASE_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);

        // An explicit backend wins; otherwise the cloud flag selects Firestore.
        let backend = match layered.remove("BACKEND").filter(|v| !v.is_empty()) {
            Some(value) => value.parse()?,
            None => {
                let use_cloud = layered
                    .remove("USE_CLOUD_DB")
                    .or_else(|| env::var("USE_CLOUD_DB").ok())
                    .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
                if use_cloud {
                    BackendKind::Firestore
                } else {
                    default_backend()
                }
            }
        };

        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let deta_project_key = layered.remove("DETA_PROJECT_KEY").filter(|v| !v.is_empty());
        let deta_api_base = layered
            .remove("DETA_API_BASE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_deta_api_base);
        let firestore_project_id = layered
            .remove("FIRESTORE_PROJECT_ID")
            .filter(|v| !v.is_empty());
        let firestore_access_token = layered
            .remove("FIRESTORE_ACCESS_TOKEN")
            .filter(|v| !v.is_empty());
        let firestore_api_base = layered
            .remove("FIRESTORE_API_BASE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_firestore_api_base);

        // Accept the conventional GITHUB_TOKEN when no prefixed token is configured.
        let github_token = layered
            .remove("GITHUB_TOKEN")
            .or_else(|| env::var("GITHUB_TOKEN").ok())
            .filter(|v| !v.is_empty());
        let github_api_base = layered
            .remove("GITHUB_API_BASE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_github_api_base);
        let commit_limit = layered
            .remove("COMMIT_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_commit_limit);

        let retry = RetryConfig {
            max_attempts: layered
                .remove("RETRY_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_max_attempts),
            initial_delay_ms: layered
                .remove("RETRY_INITIAL_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_initial_delay_ms),
            multiplier: layered
                .remove("RETRY_MULTIPLIER")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_multiplier),
        };

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            backend,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            deta_project_key,
            deta_api_base,
            firestore_project_id,
            firestore_access_token,
            firestore_api_base,
            github_token,
            github_api_base,
            commit_limit,
            retry,
        };

        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("SHOWCASE_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("SHOWCASE_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
