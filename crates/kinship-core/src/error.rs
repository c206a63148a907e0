use thiserror::Error;

#[derive(Debug, Error)]
pub enum KinshipError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, KinshipError>;
