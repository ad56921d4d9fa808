use async_openai::error::OpenAIError;
use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Provider timed out: {0}")]
    ProviderTimeout(String),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Fallback not viable: {0}")]
    FallbackNotViable(String),
    #[error("Job cancelled: {0}")]
    Cancelled(String),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Generation processing error: {0}")]
    Processing(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Provider failures the pipeline recovers from locally (rewrite fallback, failed candidate).
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            AppError::ProviderTimeout(_)
                | AppError::Provider(_)
                | AppError::OpenAI(_)
                | AppError::Reqwest(_)
                | AppError::LLMParsing(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_failures_are_classified() {
        assert!(AppError::ProviderTimeout("render".into()).is_provider_failure());
        assert!(AppError::Provider("500".into()).is_provider_failure());
        assert!(AppError::LLMParsing("bad json".into()).is_provider_failure());
        assert!(!AppError::Validation("brief".into()).is_provider_failure());
        assert!(!AppError::FallbackNotViable("no cutout".into()).is_provider_failure());
    }

    #[test]
    fn io_errors_convert_and_are_not_provider_failures() {
        let err = AppError::from(std::io::Error::other("disk full"));
        assert!(matches!(err, AppError::Io(_)));
        assert!(!err.is_provider_failure());
    }
}
