use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::PeerError;
use super::node_id::NodeId;
use crate::pex::PexPeer;

/// A wire message.
///
/// The JSON representation carries the variant in a `"type"` field; field
/// names inside the handshake are camelCase on the wire. Metadata fields of
/// the handshake may be null when the sender is a leecher that has not yet
/// learned them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    #[serde(rename_all = "camelCase")]
    Handshake {
        id: NodeId,
        file_name: Option<String>,
        file_size: Option<u64>,
        file_hash: Option<String>,
        piece_size: Option<u64>,
        port: u16,
    },
    /// The full set of piece indices the sender holds.
    Bitfield { pieces: Vec<u32> },
    Request { index: u32 },
    /// Piece data, base64-encoded.
    Piece { index: u32, data: String },
    Have { index: u32 },
    /// Peer-exchange gossip: addresses of other known peers.
    Peers { peers: Vec<PexPeer> },
}

impl Message {
    /// Builds a `piece` message, base64-encoding the payload.
    pub fn piece(index: u32, data: &[u8]) -> Self {
        Message::Piece {
            index,
            data: BASE64.encode(data),
        }
    }

    /// Decodes the base64 payload of a `piece` message.
    pub fn decode_piece_data(data: &str) -> Result<Bytes, PeerError> {
        BASE64
            .decode(data)
            .map(Bytes::from)
            .map_err(|e| PeerError::InvalidPayload(e.to_string()))
    }

    /// Serializes to a single newline-terminated line.
    pub fn to_line(&self) -> Result<String, PeerError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses one line (without requiring the trailing newline).
    pub fn from_line(line: &[u8]) -> Result<Self, PeerError> {
        Ok(serde_json::from_slice(line)?)
    }
}
