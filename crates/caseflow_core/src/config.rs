//! Runtime configuration.
//!
//! # Responsibility
//! - Load `CoreConfig` from an optional JSON file.
//! - Overlay `CASEFLOW_*` environment variables and validate the result.
//!
//! # Invariants
//! - A validated config has absolute storage/log directories, positive sizes
//!   and `default_page_size <= max_page_size <= MAX_PAGE_LIMIT`.

use crate::repo::{normalize_limit, PageRequest, MAX_PAGE_LIMIT};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "CASEFLOW_";

const DEFAULT_SESSION_TTL_MINUTES: u32 = 8 * 60;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Core configuration shared by every entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite file path. Relative paths resolve against the working directory.
    pub database_path: PathBuf,
    /// Root directory for stored document blobs.
    pub storage_dir: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub session_ttl_minutes: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_upload_bytes: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("caseflow");
        Self {
            database_path: base.join("caseflow.sqlite3"),
            storage_dir: base.join("documents"),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: base.join("logs"),
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            default_page_size: crate::repo::DEFAULT_PAGE_LIMIT,
            max_page_size: MAX_PAGE_LIMIT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Configuration load or validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    InvalidEnv { key: String, value: String },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config json `{}`: {source}", path.display())
            }
            Self::InvalidEnv { key, value } => {
                write!(f, "invalid value `{value}` for environment variable {key}")
            }
            Self::Invalid(message) => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl CoreConfig {
    /// Loads `path` (when given), overlays process environment, validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `CASEFLOW_*` overrides supplied by `lookup`. Blank values are ignored.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let read = |name: &str| -> Option<(String, String)> {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (key, value))
        };

        if let Some((_, value)) = read("DATABASE_PATH") {
            self.database_path = PathBuf::from(value);
        }
        if let Some((_, value)) = read("STORAGE_DIR") {
            self.storage_dir = PathBuf::from(value);
        }
        if let Some((_, value)) = read("LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some((_, value)) = read("LOG_DIR") {
            self.log_dir = PathBuf::from(value);
        }
        if let Some((key, value)) = read("SESSION_TTL_MINUTES") {
            self.session_ttl_minutes = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = read("DEFAULT_PAGE_SIZE") {
            self.default_page_size = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = read("MAX_PAGE_SIZE") {
            self.max_page_size = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = read("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_number(&key, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path cannot be empty".into()));
        }
        if !self.storage_dir.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "storage_dir must be absolute, got `{}`",
                self.storage_dir.display()
            )));
        }
        if !self.log_dir.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "log_dir must be absolute, got `{}`",
                self.log_dir.display()
            )));
        }
        if self.session_ttl_minutes == 0 {
            return Err(ConfigError::Invalid("session_ttl_minutes must be positive".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be positive".into()));
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(ConfigError::Invalid("page sizes must be positive".into()));
        }
        if self.max_page_size > MAX_PAGE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_page_size must not exceed {MAX_PAGE_LIMIT}"
            )));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(
                "default_page_size must not exceed max_page_size".into(),
            ));
        }
        Ok(())
    }

    /// Clamps a caller page request to the configured page sizes.
    pub fn page(&self, limit: Option<u32>, offset: u32) -> PageRequest {
        PageRequest::new(
            Some(normalize_limit(
                limit,
                self.default_page_size,
                self.max_page_size,
            )),
            offset,
        )
    }

    pub fn session_ttl_ms(&self) -> i64 {
        i64::from(self.session_ttl_minutes) * 60_000
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        CoreConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn json_file_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "session_ttl_minutes": 15, "max_page_size": 50 }}"#)
            .expect("write config");

        let config = CoreConfig::from_json_file(file.path()).expect("parse config");
        assert_eq!(config.session_ttl_minutes, 15);
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.default_page_size, CoreConfig::default().default_page_size);
    }

    #[test]
    fn malformed_json_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{{ not json").expect("write config");
        assert!(matches!(
            CoreConfig::from_json_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_take_precedence_and_blank_is_ignored() {
        let mut config = CoreConfig::default();
        config
            .apply_env(lookup(&[
                ("CASEFLOW_DEFAULT_PAGE_SIZE", "10"),
                ("CASEFLOW_LOG_LEVEL", "  "),
                ("CASEFLOW_MAX_UPLOAD_BYTES", "1024"),
            ]))
            .expect("apply env");
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.log_level, CoreConfig::default().log_level);
    }

    #[test]
    fn non_numeric_env_value_is_rejected() {
        let mut config = CoreConfig::default();
        let err = config
            .apply_env(lookup(&[("CASEFLOW_MAX_PAGE_SIZE", "lots")]))
            .expect_err("must reject");
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn validation_rejects_inverted_page_sizes_and_relative_dirs() {
        let mut config = CoreConfig::default();
        config.default_page_size = 80;
        config.max_page_size = 40;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.max_page_size = 500;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.storage_dir = "docs".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn page_uses_configured_bounds() {
        let mut config = CoreConfig::default();
        config.default_page_size = 5;
        config.max_page_size = 30;
        assert_eq!(config.page(None, 0).applied_limit(), 5);
        assert_eq!(config.page(Some(99), 10).applied_limit(), 30);
        assert_eq!(config.page(Some(7), 10).offset, 10);
    }
}
