use thiserror::Error;

pub type BucketDBResult<T, E = BucketDBError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum BucketDBError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}
