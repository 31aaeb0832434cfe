use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Audit store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Audit store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Decision not found: {decision_id}")]
    DecisionNotFound { decision_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Import failed: {message}")]
    Import { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// External collaborator errors (claim verification, crisis module, notifier)
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Pipeline-level errors surfaced to callers
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid turn input: {reason}")]
    InvalidTurnInput { reason: String },

    #[error("Unknown conversation: {conversation_id}")]
    UnknownConversation { conversation_id: String },

    #[error("Policy violation: {message}")]
    PolicyViolation { message: String },

    #[error("Audit append failed: {0}")]
    Audit(#[from] StorageError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for audit store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database connection failed: failed to connect"
        );

        let err = StorageError::DecisionNotFound {
            decision_id: "dec-123".to_string(),
        };
        assert_eq!(err.to_string(), "Decision not found: dec-123");

        let err = StorageError::Import {
            message: "truncated record".to_string(),
        };
        assert_eq!(err.to_string(), "Import failed: truncated record");
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Unavailable {
            message: "server down".to_string(),
            retries: 2,
        };
        assert_eq!(
            err.to_string(),
            "Provider unavailable: server down (retries: 2)"
        );

        let err = ProviderError::Api {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 503 - overloaded");

        let err = ProviderError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::InvalidTurnInput {
            reason: "empty text".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid turn input: empty text");

        let err = PipelineError::PolicyViolation {
            message: "tier would decrease".to_string(),
        };
        assert_eq!(err.to_string(), "Policy violation: tier would decrease");

        let err = PipelineError::UnknownConversation {
            conversation_id: "conv-9".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown conversation: conv-9");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::DecisionNotFound {
            decision_id: "d-1".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_provider_error_conversion_to_app_error() {
        let provider_err = ProviderError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = provider_err.into();
        assert!(matches!(app_err, AppError::Provider(_)));
    }

    #[test]
    fn test_pipeline_error_conversion_to_app_error() {
        let pipeline_err = PipelineError::InvalidTurnInput {
            reason: "malformed".to_string(),
        };
        let app_err: AppError = pipeline_err.into();
        assert!(matches!(app_err, AppError::Pipeline(_)));
        assert!(app_err.to_string().contains("Invalid turn input"));
    }
}
