use std::io;
use thiserror::Error;

/// Errors raised by the token ring.
#[derive(Debug, Error)]
pub enum PartitionerError {
    #[error("failed to hash key: {0}")]
    HashError(#[from] io::Error),

    #[error("invalid token `{0}`")]
    InvalidToken(String),
}
