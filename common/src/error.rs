use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Quota exhausted: no credential has capacity, retry in ~{retry_in_ms}ms")]
    QuotaExhausted { retry_in_ms: u64 },
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("External service error: {0}")]
    ExternalService(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Config load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}
