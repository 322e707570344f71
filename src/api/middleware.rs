use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::idempotency::{IdempotentProvider, Outcome};
use crate::observability::{get_metrics, LatencyTimer};

/// Request header carrying the client-supplied idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// State for [`idempotency_middleware`].
#[derive(Clone)]
pub struct IdempotencyLayerState {
    pub provider: Arc<IdempotentProvider>,
    /// Largest response body that can be captured into an outcome
    pub max_body_bytes: usize,
}

impl IdempotencyLayerState {
    pub fn new(provider: Arc<IdempotentProvider>) -> Self {
        Self {
            provider,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// HTTP response captured as an outcome payload. The body is hex encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpPayload {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Routes requests through the provider, keyed by the `Idempotency-Key` header.
///
/// Requests without the header (or with an empty one) run unconditionally.
/// Otherwise a cached 2xx response for the key is replayed, or the handler
/// runs and a 2xx response is cached.
///
/// ```ignore
/// let app = Router::new()
///     .route("/operations", post(create_operation))
///     .route_layer(middleware::from_fn_with_state(layer_state, idempotency_middleware));
/// ```
pub async fn idempotency_middleware(
    State(state): State<IdempotencyLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let timer = LatencyTimer::new();
    let method = request.method().clone();

    let key = idempotency_key(request.headers());
    // pass-through responses are never cached, so they are not size limited
    let max_body_bytes = match key {
        Some(_) => state.max_body_bytes,
        None => usize::MAX,
    };

    let outcome = state
        .provider
        .execute(key.as_deref(), move || async move {
            let response = next.run(request).await;
            response_into_outcome(response, max_body_bytes).await
        })
        .await;
    let response = outcome_into_response(outcome);

    get_metrics().record_http_request(method.as_str(), response.status().as_u16(), timer.elapsed_ms());
    response
}

/// Reads the idempotency key from `headers`, trimmed.
///
/// UTF-8 keys are used as sent. Other byte sequences are hex encoded so that
/// distinct keys stay distinct.
pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(IDEMPOTENCY_KEY_HEADER)?.as_bytes();
    let key = match std::str::from_utf8(raw) {
        Ok(key) => key.trim().to_string(),
        Err(_) => {
            tracing::debug!("Idempotency key is not UTF-8, using its hex encoding");
            hex::encode(raw)
        }
    };
    Some(key).filter(|key| !key.is_empty())
}

/// Buffers `response` into an outcome whose payload is an [`HttpPayload`].
pub async fn response_into_outcome(response: Response, max_body_bytes: usize) -> Outcome {
    let (parts, body) = response.into_parts();
    let status = parts.status.as_u16();

    let bytes = match to_bytes(body, max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(status, max_body_bytes, "Cannot buffer response body: {}", e);
            return Outcome::status(StatusCode::INTERNAL_SERVER_ERROR.as_u16());
        }
    };

    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| **name != CONTENT_LENGTH && **name != TRANSFER_ENCODING)
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let payload = HttpPayload {
        headers,
        body: hex::encode(&bytes),
    };

    match serde_json::to_value(&payload) {
        Ok(value) => Outcome::new(status, value),
        Err(e) => {
            tracing::error!(status, "Cannot capture response payload: {}", e);
            Outcome::status(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
        }
    }
}

/// Rebuilds an HTTP response from an outcome.
///
/// Payloads that are not an [`HttpPayload`] are rendered as a JSON body,
/// and a `null` payload as an empty body.
pub fn outcome_into_response(outcome: Outcome) -> Response {
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let payload = match outcome.payload {
        Value::Null => return status.into_response(),
        payload => payload,
    };

    let http_payload = match serde_json::from_value::<HttpPayload>(payload.clone()) {
        Ok(http_payload) => http_payload,
        Err(_) => return (status, Json(payload)).into_response(),
    };

    let body = match hex::decode(&http_payload.body) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Cannot decode cached response body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    for (name, value) in http_payload.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            response.headers_mut().append(name, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_response_roundtrips_through_outcome() {
        let original = (
            StatusCode::CREATED,
            [("x-operation", "charge")],
            Json(json!({"id": 42})),
        )
            .into_response();

        let outcome = response_into_outcome(original, DEFAULT_MAX_BODY_BYTES).await;
        assert_eq!(outcome.status, 201);

        let rebuilt = outcome_into_response(outcome);
        assert_eq!(rebuilt.status(), StatusCode::CREATED);
        assert_eq!(rebuilt.headers()["x-operation"], "charge");
        assert_eq!(rebuilt.headers()["content-type"], "application/json");

        let body = to_bytes(rebuilt.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["id"], 42);
    }

    #[tokio::test]
    async fn test_oversized_body_becomes_server_error() {
        let original = (StatusCode::OK, "x".repeat(64)).into_response();
        let outcome = response_into_outcome(original, 16).await;
        assert_eq!(outcome.status, 500);
        assert_eq!(outcome.payload, Value::Null);
    }

    #[test]
    fn test_idempotency_key_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers), None);

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("  order-1 "));
        assert_eq!(idempotency_key(&headers), Some("order-1".to_string()));

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("   "));
        assert_eq!(idempotency_key(&headers), None);
    }

    #[test]
    fn test_non_ascii_keys_are_not_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_bytes("zahlung-ä".as_bytes()).unwrap());
        assert_eq!(idempotency_key(&headers), Some("zahlung-ä".to_string()));

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_bytes(&[b'k', 0xff]).unwrap());
        assert_eq!(idempotency_key(&headers), Some("6bff".to_string()));

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_bytes(&[b'k', 0xfe]).unwrap());
        assert_eq!(idempotency_key(&headers), Some("6bfe".to_string()));
    }

    #[test]
    fn test_plain_payload_renders_as_json() {
        let response = outcome_into_response(Outcome::new(202, json!({"queued": true})));
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[test]
    fn test_null_payload_renders_empty() {
        let response = outcome_into_response(Outcome::status(204));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
