use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid_json: {0}")]
    InvalidJson(String),

    #[error("schema_error: {0}")]
    SchemaError(String),

    #[error("configuration_error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
