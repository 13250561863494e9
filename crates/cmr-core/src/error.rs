use thiserror::Error;

pub type CmrResult<T> = Result<T, CmrError>;

#[derive(Debug, Error)]
pub enum CmrError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
