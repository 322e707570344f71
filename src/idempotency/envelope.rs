use crate::error::Result;
use crate::idempotency::outcome::Outcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serializable record of a successful outcome, stored as an opaque string.
///
/// Wire form is JSON: `{"payload": <any json>, "status": <u16>}`. A missing
/// `payload` decodes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    #[serde(default)]
    pub payload: Value,
    pub status: u16,
}

impl ResultEnvelope {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Rebuilds the outcome exactly as it was stored.
    pub fn into_outcome(self) -> Outcome {
        Outcome::new(self.status, self.payload)
    }
}

impl From<&Outcome> for ResultEnvelope {
    fn from(outcome: &Outcome) -> Self {
        Self {
            payload: outcome.payload.clone(),
            status: outcome.status,
        }
    }
}
