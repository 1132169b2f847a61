use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file store is not open")]
    NotOpen,

    #[error("file size is not known yet")]
    SizeUnknown,

    #[error("file store is read-only")]
    ReadOnly,

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    #[error("invalid piece size: {0}")]
    InvalidPieceSize(u64),
}
