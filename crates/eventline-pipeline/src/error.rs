use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("validation_error: {0}")]
    Validation(String),

    #[error("provider_error: {0}")]
    Provider(String),

    #[error("persistence_error: {0}")]
    Persistence(String),

    #[error("configuration_error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] eventline_core::CoreError),

    #[error(transparent)]
    Extract(#[from] eventline_extract::ExtractError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
