//! Peer identity and wire protocol.
//!
//! Peers speak newline-delimited JSON over TCP: every message is one UTF-8
//! JSON object on a single line terminated by `\n`. There is no length
//! prefix; the receiver accumulates bytes and splits on newlines. Piece
//! payloads travel base64-encoded inside the JSON.
//!
//! A line that fails to parse is logged and dropped without closing the
//! connection; only an over-long line (missing its newline past the frame
//! limit) is treated as fatal.

mod error;
mod message;
mod node_id;
mod transport;

pub use error::PeerError;
pub use message::Message;
pub use node_id::NodeId;
pub use transport::{MessageReader, MessageWriter};
