use std::collections::HashMap;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{parse_peer_addr, NodeConfig};
use crate::constants::{EVENT_CHANNEL_CAPACITY, PROGRESS_INTERVAL};
use crate::peer::{Message, MessageReader, MessageWriter, NodeId, PeerError};
use crate::pex::PexPeer;
use crate::storage::{FileStore, OpenMode, StorageError};

use super::error::NodeError;
use super::peers::{ConnectionId, PeerRecord};
use super::pieces::PieceTracker;
use super::progress::ProgressReporter;
use super::scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Inbound,
    Outbound,
}

/// Everything the node task needs to know about one live socket.
struct ConnectionCtx {
    direction: Direction,
    /// Remote host: the observed address for inbound connections, the
    /// dialed host for outbound ones.
    host: String,
    /// Bound once the remote handshake arrives.
    peer_id: Option<NodeId>,
    handshake_sent: bool,
    tx: mpsc::UnboundedSender<Message>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

enum NodeEvent {
    Dialed {
        stream: TcpStream,
        host: String,
    },
    Message {
        conn: ConnectionId,
        message: Message,
    },
    Closed {
        conn: ConnectionId,
    },
}

/// A running file-distribution node.
///
/// [`Node::bind`] probes the file, binds the listener and dials the
/// bootstrap peer; [`Node::run`] then drives the event loop until the
/// process is interrupted. All state lives in the loop's task.
pub struct Node {
    listener: TcpListener,
    events: mpsc::Receiver<NodeEvent>,
    state: NodeState,
}

struct NodeState {
    id: NodeId,
    port: u16,
    is_seed: bool,
    file_name: Option<String>,
    file_hash: Option<String>,
    store: FileStore,
    tracker: PieceTracker,
    peers: HashMap<NodeId, PeerRecord>,
    connections: HashMap<ConnectionId, ConnectionCtx>,
    next_conn_id: ConnectionId,
    progress: Option<ProgressReporter>,
    events_tx: mpsc::Sender<NodeEvent>,
}

impl Node {
    /// Prepares a node from its configuration.
    ///
    /// An existing file makes the node a seed: it is opened read-only and
    /// hashed. Otherwise the path is created (truncating) and the node
    /// waits to learn the metadata from its first handshake. Binding port
    /// 0 picks an ephemeral port; the advertised port follows the actual
    /// binding.
    pub async fn bind(config: NodeConfig) -> Result<Self, NodeError> {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let port = listener.local_addr()?.port();

        let id = NodeId::generate();
        let file_name = config
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());

        let exists = tokio::fs::try_exists(&config.file).await?;
        let (store, tracker, file_hash) = if exists {
            let mut store = FileStore::open(&config.file, OpenMode::Read).await?;
            let hash = store.compute_hash().await?;
            let tracker = PieceTracker::seed(store.num_pieces());
            info!(
                file = %config.file.display(),
                size = store.file_size().unwrap_or(0),
                pieces = store.num_pieces(),
                hash = %hash,
                "seeding existing file"
            );
            (store, tracker, Some(hash))
        } else {
            let store = FileStore::open(&config.file, OpenMode::ReadWriteCreate).await?;
            info!(file = %config.file.display(), "waiting for file metadata from the swarm");
            (store, PieceTracker::leecher(0), None)
        };

        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let state = NodeState {
            id,
            port,
            is_seed: exists,
            file_name,
            file_hash,
            store,
            tracker,
            peers: HashMap::new(),
            connections: HashMap::new(),
            next_conn_id: 0,
            progress: None,
            events_tx,
        };

        info!(id = %state.id, port, "node listening");

        if let Some(peer) = &config.peer {
            let (host, peer_port) = parse_peer_addr(peer)?;
            state.dial(host, peer_port);
        } else if !state.is_seed {
            warn!("holding neither the file nor a bootstrap peer; waiting for an inbound connection");
        }

        Ok(Self {
            listener,
            events,
            state,
        })
    }

    pub fn id(&self) -> NodeId {
        self.state.id
    }

    /// The actual listening port (useful when bound to port 0).
    pub fn port(&self) -> u16 {
        self.state.port
    }

    /// Drives the node until the event channel dies or the process is
    /// interrupted.
    pub async fn run(mut self) -> Result<(), NodeError> {
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.state.handle_inbound(stream, addr.ip().to_string()),
                    Err(e) => warn!("accept failed: {e}"),
                },
                event = self.events.recv() => match event {
                    Some(event) => self.state.handle_event(event).await,
                    None => break,
                },
                _ = ticker.tick() => self.state.report_progress(),
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, shutting down");
                    break;
                }
            }
        }

        self.state.shutdown();
        Ok(())
    }
}

impl NodeState {
    async fn handle_event(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Dialed { stream, host } => self.handle_dialed(stream, host),
            NodeEvent::Message { conn, message } => self.handle_message(conn, message).await,
            NodeEvent::Closed { conn } => self.teardown_connection(conn),
        }
    }

    fn handle_inbound(&mut self, stream: TcpStream, host: String) {
        // Inbound side stays quiet until the remote handshake arrives.
        let conn = self.register_connection(stream, Direction::Inbound, host);
        debug!(conn, "accepted connection");
    }

    fn handle_dialed(&mut self, stream: TcpStream, host: String) {
        let conn = self.register_connection(stream, Direction::Outbound, host);
        let handshake = self.handshake_message();
        self.send_to(conn, handshake);
        if let Some(ctx) = self.connections.get_mut(&conn) {
            ctx.handshake_sent = true;
        }
        debug!(conn, "dialed connection, handshake sent");
    }

    async fn handle_message(&mut self, conn: ConnectionId, message: Message) {
        if !self.connections.contains_key(&conn) {
            return;
        }
        match message {
            Message::Handshake {
                id,
                file_name,
                file_size,
                file_hash,
                piece_size,
                port,
            } => {
                self.handle_handshake(conn, id, file_name, file_size, file_hash, piece_size, port)
                    .await;
            }
            Message::Bitfield { pieces } => self.handle_bitfield(conn, pieces),
            Message::Request { index } => self.handle_request(conn, index).await,
            Message::Piece { index, data } => self.handle_piece(conn, index, data).await,
            Message::Have { index } => self.handle_have(conn, index),
            Message::Peers { peers } => self.handle_peers(peers),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_handshake(
        &mut self,
        conn: ConnectionId,
        remote_id: NodeId,
        file_name: Option<String>,
        file_size: Option<u64>,
        file_hash: Option<String>,
        piece_size: Option<u64>,
        port: u16,
    ) {
        if remote_id == self.id {
            info!(conn, "dropping connection carrying our own id");
            self.teardown_connection(conn);
            self.drop_peer(remote_id);
            return;
        }

        // Bind the connection to the peer record, keyed by id so that a
        // reconnect updates the existing record. The record owns at most
        // one live connection; a previous one is invalidated here.
        let host = match self.connections.get(&conn) {
            Some(ctx) => ctx.host.clone(),
            None => return,
        };
        let stale = {
            let record = self
                .peers
                .entry(remote_id)
                .or_insert_with(|| PeerRecord::new(host.clone(), port));
            record.host = host;
            record.port = port;
            record.busy = false;
            let stale = record.connection.filter(|&old| old != conn);
            record.connection = Some(conn);
            stale
        };
        if let Some(old) = stale {
            debug!(old, new = conn, peer = %remote_id, "replacing peer connection");
            self.teardown_connection(old);
        }
        if let Some(ctx) = self.connections.get_mut(&conn) {
            ctx.peer_id = Some(remote_id);
        }

        // Metadata reconciliation.
        if self.is_seed {
            if let Some(remote_hash) = &file_hash {
                if Some(remote_hash) != self.file_hash.as_ref() {
                    warn!(peer = %remote_id, "peer is sharing a different file");
                    self.teardown_connection(conn);
                    self.drop_peer(remote_id);
                    return;
                }
            }
        } else if !self.has_metadata() {
            match (file_size, piece_size, file_hash.clone()) {
                (Some(size), Some(piece), Some(hash)) => {
                    if let Err(e) = self.adopt_metadata(file_name, size, piece, hash).await {
                        warn!(peer = %remote_id, "failed to adopt metadata: {e}");
                        self.teardown_connection(conn);
                        self.drop_peer(remote_id);
                        return;
                    }
                }
                _ => {
                    info!(peer = %remote_id, "neither side has file metadata, nothing to do");
                    self.teardown_connection(conn);
                    self.drop_peer(remote_id);
                    return;
                }
            }
        }

        // The inbound side answers the handshake it just received.
        let direction = match self.connections.get(&conn) {
            Some(ctx) => ctx.direction,
            None => return,
        };
        if direction == Direction::Inbound {
            let already_sent = self
                .connections
                .get(&conn)
                .map(|ctx| ctx.handshake_sent)
                .unwrap_or(true);
            if !already_sent {
                let handshake = self.handshake_message();
                self.send_to(conn, handshake);
                if let Some(ctx) = self.connections.get_mut(&conn) {
                    ctx.handshake_sent = true;
                }
            }
        }

        let handshake_sent = self
            .connections
            .get(&conn)
            .map(|ctx| ctx.handshake_sent)
            .unwrap_or(false);
        if let Some(record) = self.peers.get_mut(&remote_id) {
            record.handshake_sent = handshake_sent;
            record.handshake_received = true;
        }
        debug!(peer = %remote_id, conn, "handshake complete");

        // Advertise what we hold.
        if !self.tracker.have_is_empty() {
            let mut pieces = self.tracker.have_indices();
            pieces.sort_unstable();
            self.send_to(conn, Message::Bitfield { pieces });
        }

        if direction == Direction::Inbound {
            self.exchange_peers(conn, remote_id);
        }
    }

    /// Peer exchange on a fresh inbound connection: the newcomer learns all
    /// other connected peers, and every other connected peer learns the
    /// newcomer.
    fn exchange_peers(&mut self, conn: ConnectionId, newcomer: NodeId) {
        let others: Vec<PexPeer> = self
            .peers
            .iter()
            .filter(|(id, record)| **id != newcomer && record.is_connected())
            .map(|(id, record)| PexPeer::new(*id, record.host.clone(), record.port))
            .collect();
        if !others.is_empty() {
            self.send_to(conn, Message::Peers { peers: others });
        }

        let Some(record) = self.peers.get(&newcomer) else {
            return;
        };
        let announcement = Message::Peers {
            peers: vec![PexPeer::new(newcomer, record.host.clone(), record.port)],
        };
        let targets: Vec<ConnectionId> = self
            .peers
            .iter()
            .filter(|(id, _)| **id != newcomer)
            .filter_map(|(_, record)| record.connection)
            .collect();
        for target in targets {
            self.send_to(target, announcement.clone());
        }
    }

    fn handle_bitfield(&mut self, conn: ConnectionId, pieces: Vec<u32>) {
        let Some(peer_id) = self.peer_of(conn) else {
            warn!(conn, "bitfield before handshake, ignoring");
            return;
        };
        if let Some(record) = self.peers.get_mut(&peer_id) {
            record.available = pieces.into_iter().collect();
        }
        self.run_scheduler();
    }

    fn handle_have(&mut self, conn: ConnectionId, index: u32) {
        let Some(peer_id) = self.peer_of(conn) else {
            warn!(conn, "have before handshake, ignoring");
            return;
        };
        let Some(record) = self.peers.get_mut(&peer_id) else {
            return;
        };
        record.available.insert(index);
        if self.tracker.needs(index) && !record.busy {
            self.run_scheduler();
        }
    }

    async fn handle_request(&mut self, conn: ConnectionId, index: u32) {
        if !self.tracker.holds(index) {
            warn!(conn, piece = index, "request for a piece we do not hold");
            return;
        }
        match self.store.read_piece(index).await {
            Ok(bytes) => self.send_to(conn, Message::piece(index, &bytes)),
            Err(e) => warn!(piece = index, "failed to read piece: {e}"),
        }
    }

    async fn handle_piece(&mut self, conn: ConnectionId, index: u32, data: String) {
        let Some(peer_id) = self.peer_of(conn) else {
            warn!(conn, "piece before handshake, ignoring");
            return;
        };
        let bytes = match Message::decode_piece_data(&data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(peer = %peer_id, piece = index, "dropping piece: {e}");
                return;
            }
        };

        // The sender has answered our outstanding request either way.
        if let Some(record) = self.peers.get_mut(&peer_id) {
            record.busy = false;
        }

        if self.tracker.holds(index) {
            // A duplicate from the blanket pending release after a peer
            // drop; the first delivery won.
            debug!(piece = index, "duplicate piece delivery");
            self.run_scheduler();
            return;
        }

        match self.store.write_piece(index, &bytes).await {
            Err(e) => {
                warn!(piece = index, "failed to store piece: {e}");
                self.tracker.release_pending(index);
            }
            Ok(()) => {
                self.tracker.record_received(index);
                if let Some(progress) = self.progress.as_mut() {
                    progress.add_bytes(bytes.len() as u64);
                }
                debug!(
                    piece = index,
                    held = self.tracker.have_count(),
                    total = self.tracker.num_pieces(),
                    "stored piece"
                );

                // Announce the new piece before asking anyone for more
                // work, so peers see our availability first.
                self.broadcast_except(peer_id, Message::Have { index });

                if self.tracker.num_pieces() > 0 && self.tracker.is_seed() {
                    self.finish_download().await;
                }
            }
        }
        self.run_scheduler();
    }

    /// Records gossiped peers and dials the new ones this side is
    /// responsible for initiating.
    fn handle_peers(&mut self, peers: Vec<PexPeer>) {
        for peer in peers {
            if peer.id == self.id || self.peers.contains_key(&peer.id) {
                continue;
            }
            debug!(peer = %peer.id, host = %peer.host, port = peer.port, "learned peer");
            self.peers
                .insert(peer.id, PeerRecord::new(peer.host.clone(), peer.port));
            if self.id.should_initiate(&peer.id) {
                self.dial(peer.host, peer.port);
            }
        }
    }

    fn run_scheduler(&mut self) {
        if !self.has_metadata() {
            return;
        }
        for (peer_id, conn, index) in scheduler::assign(&mut self.tracker, &mut self.peers) {
            debug!(peer = %peer_id, piece = index, "requesting piece");
            self.send_to(conn, Message::Request { index });
        }
    }

    async fn finish_download(&mut self) {
        match self.progress.take() {
            Some(progress) => info!(
                bytes = progress.bytes_downloaded(),
                "download complete, continuing to seed"
            ),
            None => info!("download complete, continuing to seed"),
        }
        self.is_seed = true;

        if let Some(expected) = self.file_hash.clone() {
            match self.store.compute_hash().await {
                Ok(actual) if actual == expected => info!(hash = %actual, "file hash verified"),
                Ok(actual) => {
                    warn!(expected = %expected, actual = %actual, "file hash mismatch")
                }
                Err(e) => warn!("could not verify file hash: {e}"),
            }
        }
    }

    async fn adopt_metadata(
        &mut self,
        file_name: Option<String>,
        file_size: u64,
        piece_size: u64,
        file_hash: String,
    ) -> Result<(), StorageError> {
        self.store.set_size(file_size, piece_size).await?;
        if file_name.is_some() {
            self.file_name = file_name;
        }
        self.file_hash = Some(file_hash);
        self.tracker = PieceTracker::leecher(self.store.num_pieces());
        self.progress = Some(ProgressReporter::start());
        info!(
            size = file_size,
            piece_size = self.store.piece_size(),
            pieces = self.store.num_pieces(),
            "adopted file metadata"
        );

        if self.tracker.is_seed() {
            // Zero-length file: there is nothing to fetch.
            self.finish_download().await;
        }
        Ok(())
    }

    fn handshake_message(&self) -> Message {
        Message::Handshake {
            id: self.id,
            file_name: self.file_name.clone(),
            file_size: self.store.file_size(),
            file_hash: self.file_hash.clone(),
            piece_size: self.has_metadata().then(|| self.store.piece_size()),
            port: self.port,
        }
    }

    fn has_metadata(&self) -> bool {
        self.store.file_size().is_some()
    }

    /// Removes a peer record, closing its connection if one is live.
    fn drop_peer(&mut self, id: NodeId) {
        if let Some(record) = self.peers.remove(&id) {
            if let Some(conn) = record.connection {
                self.teardown_connection(conn);
            }
        }
    }

    fn peer_of(&self, conn: ConnectionId) -> Option<NodeId> {
        self.connections.get(&conn).and_then(|ctx| ctx.peer_id)
    }

    fn send_to(&self, conn: ConnectionId, message: Message) {
        if let Some(ctx) = self.connections.get(&conn) {
            // Fire-and-forget: a dead writer surfaces as a close event.
            let _ = ctx.tx.send(message);
        }
    }

    fn broadcast_except(&self, except: NodeId, message: Message) {
        for (id, record) in &self.peers {
            if *id == except {
                continue;
            }
            if let Some(conn) = record.connection {
                self.send_to(conn, message.clone());
            }
        }
    }

    fn dial(&self, host: String, port: u16) {
        debug!(%host, port, "dialing peer");
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            match TcpStream::connect((host.as_str(), port)).await {
                Ok(stream) => {
                    let _ = events.send(NodeEvent::Dialed { stream, host }).await;
                }
                Err(e) => warn!(%host, port, "connect failed: {e}"),
            }
        });
    }

    fn register_connection(
        &mut self,
        stream: TcpStream,
        direction: Direction,
        host: String,
    ) -> ConnectionId {
        let conn = self.next_conn_id;
        self.next_conn_id += 1;

        let (read_half, write_half) = stream.into_split();

        let (tx, mut outbox) = mpsc::unbounded_channel::<Message>();
        let writer_task = tokio::spawn(async move {
            let mut writer = MessageWriter::new(write_half);
            while let Some(message) = outbox.recv().await {
                if let Err(e) = writer.send(&message).await {
                    debug!("write failed: {e}");
                    break;
                }
            }
        });

        let events = self.events_tx.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = MessageReader::new(read_half);
            loop {
                match reader.next().await {
                    Ok(message) => {
                        if events
                            .send(NodeEvent::Message { conn, message })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        match e {
                            PeerError::ConnectionClosed => debug!(conn, "connection closed"),
                            e => warn!(conn, "connection error: {e}"),
                        }
                        let _ = events.send(NodeEvent::Closed { conn }).await;
                        break;
                    }
                }
            }
        });

        self.connections.insert(
            conn,
            ConnectionCtx {
                direction,
                host,
                peer_id: None,
                handshake_sent: false,
                tx,
                reader_task,
                writer_task,
            },
        );
        conn
    }

    /// Tears one connection down: unbinds it from its peer record, returns
    /// every outstanding request to the pool (all of them, not only those
    /// owed by this connection), and reschedules.
    fn teardown_connection(&mut self, conn: ConnectionId) {
        let Some(ctx) = self.connections.remove(&conn) else {
            return;
        };
        ctx.reader_task.abort();
        // The writer drains its queue and exits once `ctx.tx` drops.

        if let Some(peer_id) = ctx.peer_id {
            if let Some(record) = self.peers.get_mut(&peer_id) {
                if record.connection == Some(conn) {
                    record.connection = None;
                    record.busy = false;
                    record.handshake_sent = false;
                    record.handshake_received = false;
                }
            }
        }

        self.tracker.release_all_pending();
        self.run_scheduler();
    }

    fn shutdown(&mut self) {
        for (_, ctx) in self.connections.drain() {
            ctx.reader_task.abort();
            ctx.writer_task.abort();
        }
        self.store.close();
        info!("node stopped");
    }

    fn report_progress(&self) {
        if self.is_seed {
            return;
        }
        let (Some(progress), Some(file_size)) = (&self.progress, self.store.file_size()) else {
            return;
        };
        progress.report(
            file_size,
            self.tracker.missing_count() as u64,
            self.store.piece_size(),
        );
    }
}
