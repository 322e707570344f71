pub mod envelope;
pub mod operation;
pub mod outcome;
pub mod provider;

pub use envelope::ResultEnvelope;
pub use operation::Operation;
pub use outcome::{leading_digit, Outcome};
pub use provider::{IdempotencyMetrics, IdempotentProvider, MetricsSnapshot};
