use crate::error::{AppError, Result};
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::{Validate, ValidationError};

pub const MEMORY: &str = "memory";
pub const REDIS: &str = "redis";
pub const POSTGRES: &str = "postgres";
pub const DEFAULT_IMPLEMENTATION: &str = MEMORY;

/// Upper bound for `time_to_live_ms` and `time_to_idle_ms` (100 years).
pub const MAX_EXPIRY_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationSettings,
    pub idempotency: IdempotencySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Storage backends the factory knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redis,
    Postgres,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => MEMORY,
            StorageBackend::Redis => REDIS,
            StorageBackend::Postgres => POSTGRES,
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            MEMORY => Ok(StorageBackend::Memory),
            REDIS => Ok(StorageBackend::Redis),
            POSTGRES => Ok(StorageBackend::Postgres),
            _ => Err(AppError::Configuration(format!(
                "Unsupported [storage_implementation] specified '{}'",
                s
            ))),
        }
    }
}

/// Idempotency cache settings.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_backend_settings", skip_on_field_errors = false))]
pub struct IdempotencySettings {
    #[serde(default = "default_implementation")]
    #[validate(length(min = 1))]
    pub storage_implementation: String,
    #[validate(custom = "validate_cache_name")]
    pub cache_name: String,
    /// Maximum entry lifetime from creation, in milliseconds (0 = unused)
    #[serde(default)]
    pub time_to_live_ms: u64,
    /// Maximum entry lifetime from last access, in milliseconds (0 = unused)
    #[serde(default)]
    pub time_to_idle_ms: u64,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

fn default_implementation() -> String {
    DEFAULT_IMPLEMENTATION.to_string()
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            storage_implementation: default_implementation(),
            cache_name: "idempotency".to_string(),
            time_to_live_ms: 0,
            time_to_idle_ms: 0,
            redis_url: None,
            database_url: None,
            sweep_interval_secs: None,
        }
    }
}

impl IdempotencySettings {
    /// Resolves the configured backend name.
    pub fn backend(&self) -> Result<StorageBackend> {
        self.storage_implementation.parse()
    }

    pub fn time_to_live(&self) -> Duration {
        Duration::from_millis(self.time_to_live_ms)
    }

    pub fn time_to_idle(&self) -> Duration {
        Duration::from_millis(self.time_to_idle_ms)
    }

    /// Validates the settings, mapping failures to a configuration error.
    pub fn check(&self) -> Result<()> {
        self.backend()?;
        self.validate()
            .map_err(|e| AppError::Configuration(e.to_string()))
    }
}

fn validation_error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::from(message));
    err
}

/// Cache names double as Redis key prefixes and Postgres table names.
pub fn is_valid_cache_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_cache_name(name: &str) -> std::result::Result<(), ValidationError> {
    if is_valid_cache_name(name) {
        Ok(())
    } else {
        Err(validation_error(
            "cache_name",
            format!("cache_name '{}' must match [A-Za-z_][A-Za-z0-9_]*", name),
        ))
    }
}

fn validate_backend_settings(
    settings: &IdempotencySettings,
) -> std::result::Result<(), ValidationError> {
    let missing = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());

    for (name, value) in [
        ("time_to_live_ms", settings.time_to_live_ms),
        ("time_to_idle_ms", settings.time_to_idle_ms),
    ] {
        if value > MAX_EXPIRY_MS {
            return Err(validation_error(
                name,
                format!("{} must not exceed {} (got {})", name, MAX_EXPIRY_MS, value),
            ));
        }
    }

    match settings.backend() {
        Ok(StorageBackend::Redis) if missing(&settings.redis_url) => Err(validation_error(
            "redis_url",
            "redis_url is required when storage_implementation is 'redis'".to_string(),
        )),
        Ok(StorageBackend::Postgres) if missing(&settings.database_url) => Err(validation_error(
            "database_url",
            "database_url is required when storage_implementation is 'postgres'".to_string(),
        )),
        Ok(_) => Ok(()),
        Err(e) => Err(validation_error("storage_implementation", e.to_string())),
    }
}

impl Settings {
    pub fn new() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.idempotency.check()?;
        Ok(settings)
    }

    /// Loads settings from an inline TOML document.
    pub fn from_toml(source: &str) -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.idempotency.check()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!("Redis".parse::<StorageBackend>().unwrap(), StorageBackend::Redis);
        assert_eq!(" postgres ".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);

        let err = "hazelcast".parse::<StorageBackend>().unwrap_err();
        assert!(err.to_string().contains("Unsupported [storage_implementation] specified 'hazelcast'"));
    }

    #[test]
    fn test_cache_name_rules() {
        assert!(is_valid_cache_name("testing"));
        assert!(is_valid_cache_name("_idem_2"));
        assert!(!is_valid_cache_name(""));
        assert!(!is_valid_cache_name("2fast"));
        assert!(!is_valid_cache_name("drop table;"));
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = IdempotencySettings::default();
        assert!(settings.check().is_ok());
        assert_eq!(settings.backend().unwrap(), StorageBackend::Memory);
        assert_eq!(settings.time_to_live(), Duration::ZERO);
    }

    #[test]
    fn test_redis_requires_url() {
        let settings = IdempotencySettings {
            storage_implementation: REDIS.to_string(),
            ..Default::default()
        };
        let err = settings.check().unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(err.to_string().contains("redis_url"));
    }

    #[test]
    fn test_rejects_unbounded_expiry() {
        let settings = IdempotencySettings {
            time_to_live_ms: i64::MAX as u64,
            ..Default::default()
        };
        let err = settings.check().unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(err.to_string().contains("time_to_live_ms"));

        let settings = IdempotencySettings {
            time_to_idle_ms: MAX_EXPIRY_MS + 1,
            ..Default::default()
        };
        assert!(settings.check().unwrap_err().to_string().contains("time_to_idle_ms"));

        let settings = IdempotencySettings {
            time_to_live_ms: MAX_EXPIRY_MS,
            ..Default::default()
        };
        assert!(settings.check().is_ok());
    }

    #[test]
    fn test_postgres_requires_url() {
        let settings = IdempotencySettings {
            storage_implementation: POSTGRES.to_string(),
            database_url: Some("  ".to_string()),
            ..Default::default()
        };
        let err = settings.check().unwrap_err();
        assert!(err.to_string().contains("database_url"));
    }
}
