use crate::idempotency::outcome::Outcome;
use std::future::Future;

/// The work to perform when no cached outcome exists for a key.
///
/// Consumed on use: the provider runs an operation at most once per call.
/// Any async closure `|| async { ... }` returning an [`Outcome`] qualifies.
pub trait Operation: Send {
    fn run(self) -> impl Future<Output = Outcome> + Send;
}

impl<F, Fut> Operation for F
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Outcome> + Send,
{
    fn run(self) -> impl Future<Output = Outcome> + Send {
        self()
    }
}
