use serde::Deserialize;
use validator::Validate;

/// Request submitted to the pipeline, shared by the gRPC and JSON front ends
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IngestRequest {
    /// Correlation id of at most 128 characters; generated when absent or empty
    #[serde(default)]
    #[validate(length(max = 128))]
    pub id: Option<String>,

    #[validate(length(min = 1))]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        let ok = IngestRequest {
            id: Some("r1".to_string()),
            content: "hello".to_string(),
        };
        assert!(ok.validate().is_ok());

        let empty = IngestRequest {
            id: None,
            content: String::new(),
        };
        assert!(empty.validate().unwrap_err().field_errors().contains_key("content"));

        let long_id = IngestRequest {
            id: Some("x".repeat(129)),
            content: "hello".to_string(),
        };
        assert!(long_id.validate().unwrap_err().field_errors().contains_key("id"));

        let max_id = IngestRequest {
            id: Some("é".repeat(128)),
            content: "hello".to_string(),
        };
        assert!(max_id.validate().is_ok());
    }
}
