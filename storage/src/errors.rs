use thiserror::Error;

/// Errors returned by a [`StorageEngine`](crate::StorageEngine).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The table name of a write was empty.
    #[error("table name must not be empty")]
    EmptyTable,

    /// The key of a write was empty.
    #[error("key must not be empty")]
    EmptyKey,
}
