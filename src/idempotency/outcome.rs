use serde_json::Value;

/// Result of running a guarded operation: a status code and an opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: u16,
    pub payload: Value,
}

impl Outcome {
    pub fn new(status: u16, payload: Value) -> Self {
        Self { status, payload }
    }

    /// Outcome with a `null` payload.
    pub fn status(status: u16) -> Self {
        Self::new(status, Value::Null)
    }

    /// Only outcomes whose status starts with the digit 2 are eligible for caching.
    pub fn is_success(&self) -> bool {
        leading_digit(self.status) == 2
    }
}

/// Most significant decimal digit of `code`.
pub fn leading_digit(code: u16) -> u16 {
    let mut code = code;
    while code >= 10 {
        code /= 10;
    }
    code
}
