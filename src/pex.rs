//! Peer exchange.
//!
//! Connected peers gossip addresses of other peers they know about, so a
//! swarm stays connected without any central tracker. When a new inbound
//! peer completes its handshake, the node sends it every other connected
//! peer's address and advertises the newcomer to each of them.
//!
//! A node that learns of an unknown peer does not always dial it: only the
//! side with the greater id initiates (see [`NodeId::should_initiate`]), so
//! each unordered pair of nodes establishes exactly one connection.
//!
//! [`NodeId::should_initiate`]: crate::peer::NodeId::should_initiate

use serde::{Deserialize, Serialize};

use crate::peer::NodeId;

/// A peer address as carried in `peers` gossip messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PexPeer {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl PexPeer {
    pub fn new(id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }
}
