pub mod handlers;
pub mod middleware;
pub mod requests;
pub mod responses;
pub mod routes;

pub use middleware::{
    idempotency_key, idempotency_middleware, outcome_into_response, response_into_outcome, HttpPayload,
    IdempotencyLayerState, IDEMPOTENCY_KEY_HEADER,
};
pub use routes::{create_router, AppState};
