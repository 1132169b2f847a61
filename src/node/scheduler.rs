use std::collections::HashMap;

use crate::peer::NodeId;

use super::peers::{ConnectionId, PeerRecord};
use super::pieces::PieceTracker;

/// One deterministic scheduling pass.
///
/// For each connected, handshaken, non-busy peer, assigns the first of that
/// peer's available pieces that is missing and not already requested. At
/// most one piece is outstanding per peer at a time. Assigned pieces are
/// marked pending and the peers busy; the caller sends the `request`
/// messages.
pub(super) fn assign(
    tracker: &mut PieceTracker,
    peers: &mut HashMap<NodeId, PeerRecord>,
) -> Vec<(NodeId, ConnectionId, u32)> {
    let mut assignments = Vec::new();

    for (id, record) in peers.iter_mut() {
        let Some(conn) = record.connection else {
            continue;
        };
        if record.busy || !record.handshake_received {
            continue;
        }
        let Some(&index) = record.available.iter().find(|&&i| tracker.needs(i)) else {
            continue;
        };

        tracker.mark_pending(index);
        record.busy = true;
        assignments.push((*id, conn, index));
    }

    assignments
}
