use std::fmt::Write as _;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha1::{Digest, Sha1};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::error::StorageError;
use crate::constants::DEFAULT_PIECE_SIZE;

const HASH_READ_BUF_SIZE: usize = 64 * 1024;

/// How the backing file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing file read-only. The on-disk size is recorded.
    Read,
    /// Create the file, truncating if it exists. The size stays unknown
    /// until [`FileStore::set_size`].
    ReadWriteCreate,
}

/// Piece-granular random access to the shared file.
///
/// All pieces are `piece_size` bytes except possibly the last, which covers
/// the remainder. In [`OpenMode::Read`] a file smaller than the default
/// piece size collapses `piece_size` down to the file size, so such files
/// are always exactly one piece.
///
/// The store is single-owner; the node task is the only caller.
pub struct FileStore {
    path: PathBuf,
    mode: OpenMode,
    file: Option<File>,
    file_size: Option<u64>,
    piece_size: u64,
}

impl FileStore {
    pub async fn open(path: &Path, mode: OpenMode) -> Result<Self, StorageError> {
        let (file, file_size) = match mode {
            OpenMode::Read => {
                let file = File::open(path).await?;
                let size = file.metadata().await?.len();
                (file, Some(size))
            }
            OpenMode::ReadWriteCreate => {
                let file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .truncate(true)
                    .open(path)
                    .await?;
                (file, None)
            }
        };

        let piece_size = match file_size {
            Some(size) if size > 0 && size < DEFAULT_PIECE_SIZE => size,
            _ => DEFAULT_PIECE_SIZE,
        };

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            file: Some(file),
            file_size,
            piece_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// The total file length, if known yet.
    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    pub fn piece_size(&self) -> u64 {
        self.piece_size
    }

    /// Number of pieces the file divides into. Zero for an empty file and
    /// for a leecher that has not learned the size yet.
    pub fn num_pieces(&self) -> u32 {
        match self.file_size {
            Some(size) if size > 0 => size.div_ceil(self.piece_size) as u32,
            _ => 0,
        }
    }

    /// Length of the piece at `index`: `piece_size` everywhere except the
    /// tail, which covers the remaining bytes.
    pub fn piece_len(&self, index: u32) -> Result<u64, StorageError> {
        let file_size = self.file_size.ok_or(StorageError::SizeUnknown)?;
        if index >= self.num_pieces() {
            return Err(StorageError::InvalidPieceIndex(index));
        }
        Ok(self.piece_size.min(file_size - u64::from(index) * self.piece_size))
    }

    /// Sizes the backing file to exactly `file_size` bytes and fixes the
    /// piece geometry. Only legal in read-write mode; called once, when a
    /// handshake first supplies the metadata.
    pub async fn set_size(&mut self, file_size: u64, piece_size: u64) -> Result<(), StorageError> {
        if self.mode != OpenMode::ReadWriteCreate {
            return Err(StorageError::ReadOnly);
        }
        if piece_size == 0 && file_size > 0 {
            return Err(StorageError::InvalidPieceSize(piece_size));
        }

        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        file.set_len(file_size).await?;

        self.file_size = Some(file_size);
        if piece_size > 0 {
            self.piece_size = piece_size;
        }
        Ok(())
    }

    /// Reads the piece at `index` from its offset in the file.
    pub async fn read_piece(&mut self, index: u32) -> Result<Bytes, StorageError> {
        let len = self.piece_len(index)?;
        let offset = u64::from(index) * self.piece_size;

        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Writes piece data at the piece's offset. The caller is trusted to
    /// supply data of the correct length.
    pub async fn write_piece(&mut self, index: u32, data: &[u8]) -> Result<(), StorageError> {
        if self.mode != OpenMode::ReadWriteCreate {
            return Err(StorageError::ReadOnly);
        }
        if index >= self.num_pieces() {
            return Err(StorageError::InvalidPieceIndex(index));
        }
        let offset = u64::from(index) * self.piece_size;

        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        Ok(())
    }

    /// Streams the entire file through SHA-1 and returns the lowercase hex
    /// digest.
    pub async fn compute_hash(&mut self) -> Result<String, StorageError> {
        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        file.seek(SeekFrom::Start(0)).await?;

        let mut hasher = Sha1::new();
        let mut buf = vec![0u8; HASH_READ_BUF_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Ok(hex)
    }

    /// Releases the file handle. Idempotent.
    pub fn close(&mut self) {
        self.file = None;
    }
}
