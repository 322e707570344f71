use thiserror::Error;

/// Errors raised by the cache backends, configuration and the codec.
///
/// None of these ever reach the caller of
/// [`IdempotentProvider::execute`](crate::idempotency::IdempotentProvider::execute);
/// the provider absorbs them and reports them through logging and metrics.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration source error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short label used for metric dimensions.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Redis(_) => "redis",
            AppError::Database(_) => "database",
            AppError::Serialization(_) => "serialization",
            AppError::Config(_) | AppError::Configuration(_) => "configuration",
            AppError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
