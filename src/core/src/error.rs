use thiserror::Error;

/// A3S Enrich error types
#[derive(Error, Debug)]
pub enum EnrichError {
    /// Registry could not be reached or the repository reference is invalid
    #[error("Registry connection failed: {registry} - {message}")]
    ConnectFailed { registry: String, message: String },

    /// Manifest or blob does not exist in the registry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Manifest bytes could not be decoded
    #[error("Manifest decode failed: {0}")]
    DecodeFailed(String),

    /// Blob transfer failed or the received content does not match its descriptor
    #[error("Blob read failed: {digest} - {message}")]
    IoFailed { digest: String, message: String },

    /// Manifest push rejected by the registry
    #[error("Manifest push failed: {reference} - {message}")]
    PushFailed { reference: String, message: String },

    /// Tag update rejected by the registry
    #[error("Tag update failed: {tag} - {message}")]
    TagFailed { tag: String, message: String },

    /// Description service rejected the credential
    #[error("Description service unauthorized: {0}")]
    Unauthorized(String),

    /// Description service throttled the request
    #[error("Description service rate limited: {0}")]
    RateLimited(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Description service answered with something other than a usable completion
    #[error("Malformed description response{}: {message}", status_suffix(.status))]
    MalformedResponse {
        status: Option<u16>,
        message: String,
    },

    /// Description service could not be reached
    #[error("Description service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Inbound request body could not be read
    #[error("Request body read failed: {0}")]
    BodyReadFailed(String),

    /// Inbound request body is not a notification batch
    #[error("Payload decode failed: {0}")]
    PayloadDecodeFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({})", code)).unwrap_or_default()
}

impl From<serde_json::Error> for EnrichError {
    fn from(err: serde_json::Error) -> Self {
        EnrichError::SerializationError(err.to_string())
    }
}

/// Result type alias for A3S Enrich operations
pub type Result<T> = std::result::Result<T, EnrichError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failed_display() {
        let error = EnrichError::ConnectFailed {
            registry: "registry:5000".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registry connection failed: registry:5000 - connection refused"
        );
    }

    #[test]
    fn test_io_failed_display() {
        let error = EnrichError::IoFailed {
            digest: "sha256:abc".to_string(),
            message: "size mismatch".to_string(),
        };
        assert_eq!(error.to_string(), "Blob read failed: sha256:abc - size mismatch");
    }

    #[test]
    fn test_tag_failed_display() {
        let error = EnrichError::TagFailed {
            tag: "latest".to_string(),
            message: "denied".to_string(),
        };
        assert_eq!(error.to_string(), "Tag update failed: latest - denied");
    }

    #[test]
    fn test_malformed_response_with_status() {
        let error = EnrichError::MalformedResponse {
            status: Some(500),
            message: "internal error".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Malformed description response (500): internal error"
        );
    }

    #[test]
    fn test_malformed_response_without_status() {
        let error = EnrichError::MalformedResponse {
            status: None,
            message: "no choices".to_string(),
        };
        assert_eq!(error.to_string(), "Malformed description response: no choices");
    }

    #[test]
    fn test_timeout_display() {
        let error = EnrichError::Timeout("description after 30s".to_string());
        assert_eq!(error.to_string(), "Timeout: description after 30s");
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let error: EnrichError = result.unwrap_err().into();
        assert!(matches!(error, EnrichError::SerializationError(_)));
    }

    #[test]
    fn test_error_is_debug() {
        let error = EnrichError::NotFound("app@sha256:abc".to_string());
        assert!(format!("{:?}", error).contains("NotFound"));
    }
}
