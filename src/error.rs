use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum LoregraphError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Requested entity was not found.
    #[error("Not found: {entity_type} with id '{id}'")]
    NotFound { entity_type: String, id: String },

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict detected (e.g. duplicate keys, concurrent modifications).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Query execution failed.
    #[error("Query error: {message}")]
    Query {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM backend call failed.
    #[error("LLM error: {0}")]
    Llm(String),

    /// LLM backend call exceeded its deadline.
    #[error("LLM call timed out after {0:?}")]
    LlmTimeout(std::time::Duration),

    /// Fact extraction could not produce a usable result for a chapter.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Referenced analysis task does not exist.
    #[error("Analysis task not found: {0}")]
    TaskNotFound(String),

    /// Requested transition conflicts with the task's current state.
    #[error("Analysis task conflict: {0}")]
    TaskConflict(String),
}

impl From<surrealdb::Error> for LoregraphError {
    fn from(err: surrealdb::Error) -> Self {
        LoregraphError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for LoregraphError {
    fn from(err: serde_json::Error) -> Self {
        LoregraphError::Validation(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for LoregraphError {
    fn from(err: std::io::Error) -> Self {
        LoregraphError::Database(format!("I/O error: {}", err))
    }
}

impl From<reqwest::Error> for LoregraphError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // The elapsed duration isn't exposed by reqwest's error type;
            // callers that need the configured deadline read it off their
            // own `LlmConfig` rather than this error.
            return LoregraphError::LlmTimeout(std::time::Duration::default());
        }
        LoregraphError::Llm(err.to_string())
    }
}
