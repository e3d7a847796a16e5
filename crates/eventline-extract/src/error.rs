use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("provider_error: {0}")]
    Provider(String),

    #[error(transparent)]
    Core(#[from] eventline_core::CoreError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type ExtractResult<T> = Result<T, ExtractError>;
