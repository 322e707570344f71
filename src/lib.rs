pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod factory;
pub mod idempotency;
pub mod observability;

pub use cache::{Cache, ExpiryPolicy, InMemoryCache, PostgresCache, RedisCache};
pub use error::{AppError, Result};
pub use factory::{IdempotencyComponents, IdempotencyFactory};
pub use idempotency::{IdempotentProvider, Operation, Outcome, ResultEnvelope};
