use serde::{Deserialize, Serialize};

use super::responses::ValidationErrorDetail;

/// Request to submit a side-effecting operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOperationRequest {
    pub name: String,
    pub input: Option<serde_json::Value>,
}

impl CreateOperationRequest {
    pub fn validate(&self) -> Result<(), Vec<ValidationErrorDetail>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(ValidationErrorDetail { field: "name".to_string(), message: "name cannot be empty".to_string() });
        }
        if self.name.len() > 128 {
            errors.push(ValidationErrorDetail { field: "name".to_string(), message: "name cannot exceed 128 characters".to_string() });
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        let ok = CreateOperationRequest { name: "charge".to_string(), input: None };
        assert!(ok.validate().is_ok());

        let blank = CreateOperationRequest { name: "  ".to_string(), input: None };
        let errors = blank.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
    }
}
