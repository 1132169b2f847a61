use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid peer address: {0}")]
    InvalidPeerAddress(String),
}
