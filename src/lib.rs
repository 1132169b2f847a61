//! shoal - a trackerless peer-to-peer file distribution node
//!
//! A mesh of shoal nodes cooperatively transfers a single file. Every node
//! is simultaneously client and server: it accepts inbound connections,
//! dials outbound peers, advertises the pieces it holds, requests missing
//! pieces, and gossips peer addresses so the swarm needs no tracker. A node
//! that starts with the complete file seeds it; one that starts with only a
//! destination path downloads it and then seeds in turn.
//!
//! # Modules
//!
//! - [`node`] - The node core: listener, dialer, dispatch, scheduling
//! - [`peer`] - Peer identity and the newline-framed JSON wire protocol
//! - [`pex`] - Peer-exchange gossip and the connection-initiation rule
//! - [`storage`] - Piece-granular file I/O and whole-file hashing
//! - [`config`] - Command-line configuration surface
//! - [`constants`] - Protocol constants and tuning parameters

pub mod config;
pub mod constants;
pub mod node;
pub mod peer;
pub mod pex;
pub mod storage;

pub use config::NodeConfig;
pub use node::{Node, NodeError, PeerRecord, PieceTracker};
pub use peer::{Message, MessageReader, MessageWriter, NodeId, PeerError};
pub use pex::PexPeer;
pub use storage::{FileStore, OpenMode, StorageError};
