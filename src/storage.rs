//! Disk storage for the shared file.
//!
//! The node distributes exactly one file, addressed in fixed-size pieces.
//! This module owns the random-access handle to that file: piece-granular
//! reads and writes, sizing, and the whole-file SHA-1 used as the swarm's
//! identity.
//!
//! # Overview
//!
//! A seed opens its file read-only and serves pieces from it. A leecher
//! opens (creating or truncating) its destination read-write, learns the
//! final size from the first handshake that carries metadata, and fills the
//! file in piece-sized writes as data arrives.
//!
//! # Examples
//!
//! ```no_run
//! use shoal::storage::{FileStore, OpenMode};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = FileStore::open(Path::new("movie.mkv"), OpenMode::Read).await?;
//!
//! let hash = store.compute_hash().await?;
//! let first = store.read_piece(0).await?;
//! println!("{} pieces, hash {}", store.num_pieces(), hash);
//! # let _ = first;
//! # Ok(())
//! # }
//! ```

mod error;
mod file;

pub use error::StorageError;
pub use file::{FileStore, OpenMode};
