use super::*;
use crate::config::NodeConfig;
use crate::peer::{Message, MessageReader, MessageWriter, NodeId};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;

fn config(file: PathBuf, peer: Option<String>) -> NodeConfig {
    NodeConfig {
        port: 0,
        file,
        peer,
    }
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}

fn sha1_hex(data: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

async fn wait_for_file(path: &Path, expected: &[u8]) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while tokio::time::Instant::now() < deadline {
        if let Ok(content) = std::fs::read(path) {
            if content == expected {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {} to match", path.display());
}

async fn spawn_seed(temp: &TempDir, content: &[u8]) -> (PathBuf, u16) {
    let path = temp.path().join("seed.dat");
    tokio::fs::write(&path, content).await.unwrap();
    let seed = Node::bind(config(path.clone(), None)).await.unwrap();
    let port = seed.port();
    tokio::spawn(seed.run());
    (path, port)
}

/// A scripted remote peer for driving the protocol by hand.
struct RawPeer {
    reader: MessageReader<tokio::net::tcp::OwnedReadHalf>,
    writer: MessageWriter<tokio::net::tcp::OwnedWriteHalf>,
    id: NodeId,
}

impl RawPeer {
    async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: MessageReader::new(read_half),
            writer: MessageWriter::new(write_half),
            id: NodeId::generate(),
        }
    }

    async fn send_empty_handshake(&mut self) {
        self.send_handshake_as(self.id).await;
    }

    async fn send_handshake_as(&mut self, id: NodeId) {
        self.writer
            .send(&Message::Handshake {
                id,
                file_name: None,
                file_size: None,
                file_hash: None,
                piece_size: None,
                port: 1,
            })
            .await
            .unwrap();
    }

    async fn next(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(5), self.reader.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed unexpectedly")
    }

    async fn expect_closed(&mut self) {
        let result = tokio::time::timeout(Duration::from_secs(5), self.reader.next())
            .await
            .expect("timed out waiting for close");
        assert!(result.is_err(), "expected close, got {result:?}");
    }
}

#[tokio::test]
async fn test_seed_to_leecher_transfer() {
    let temp = TempDir::new().unwrap();
    let content = patterned(150_000);
    let (_, seed_port) = spawn_seed(&temp, &content).await;

    let dest = temp.path().join("dest.dat");
    let leecher = Node::bind(config(dest.clone(), Some(format!("127.0.0.1:{seed_port}"))))
        .await
        .unwrap();
    tokio::spawn(leecher.run());

    wait_for_file(&dest, &content).await;
}

#[tokio::test]
async fn test_small_file_is_a_single_piece() {
    let temp = TempDir::new().unwrap();
    let content = b"hello, swarm".to_vec();
    let (_, seed_port) = spawn_seed(&temp, &content).await;

    let dest = temp.path().join("dest.dat");
    let leecher = Node::bind(config(dest.clone(), Some(format!("127.0.0.1:{seed_port}"))))
        .await
        .unwrap();
    tokio::spawn(leecher.run());

    wait_for_file(&dest, &content).await;
}

#[tokio::test]
async fn test_completed_leecher_serves_a_new_peer() {
    let temp = TempDir::new().unwrap();
    let content = patterned(80_000);
    let (_, seed_port) = spawn_seed(&temp, &content).await;

    let dest = temp.path().join("dest.dat");
    let leecher = Node::bind(config(dest.clone(), Some(format!("127.0.0.1:{seed_port}"))))
        .await
        .unwrap();
    let leecher_port = leecher.port();
    tokio::spawn(leecher.run());
    wait_for_file(&dest, &content).await;

    // A second leecher bootstraps off the first one, not the seed.
    let second = temp.path().join("second.dat");
    let node = Node::bind(config(
        second.clone(),
        Some(format!("127.0.0.1:{leecher_port}")),
    ))
    .await
    .unwrap();
    tokio::spawn(node.run());

    wait_for_file(&second, &content).await;
}

#[tokio::test]
async fn test_two_leechers_complete_against_one_seed() {
    let temp = TempDir::new().unwrap();
    let content = patterned(200_000);
    let (_, seed_port) = spawn_seed(&temp, &content).await;

    let dest_a = temp.path().join("a.dat");
    let dest_b = temp.path().join("b.dat");
    let bootstrap = Some(format!("127.0.0.1:{seed_port}"));

    let a = Node::bind(config(dest_a.clone(), bootstrap.clone()))
        .await
        .unwrap();
    let b = Node::bind(config(dest_b.clone(), bootstrap)).await.unwrap();
    tokio::spawn(a.run());
    tokio::spawn(b.run());

    wait_for_file(&dest_a, &content).await;
    wait_for_file(&dest_b, &content).await;
}

#[tokio::test]
async fn test_seed_answers_a_scripted_leecher() {
    let temp = TempDir::new().unwrap();
    let content = patterned(100_000);
    let (_, seed_port) = spawn_seed(&temp, &content).await;

    let mut peer = RawPeer::connect(seed_port).await;
    peer.send_empty_handshake().await;

    match peer.next().await {
        Message::Handshake {
            file_size,
            file_hash,
            piece_size,
            ..
        } => {
            assert_eq!(file_size, Some(100_000));
            assert_eq!(piece_size, Some(65536));
            assert!(file_hash.is_some());
        }
        other => panic!("expected handshake, got {other:?}"),
    }

    match peer.next().await {
        Message::Bitfield { pieces } => assert_eq!(pieces, vec![0, 1]),
        other => panic!("expected bitfield, got {other:?}"),
    }

    peer.writer
        .send(&Message::Request { index: 1 })
        .await
        .unwrap();
    match peer.next().await {
        Message::Piece { index, data } => {
            assert_eq!(index, 1);
            let bytes = Message::decode_piece_data(&data).unwrap();
            assert_eq!(bytes.as_ref(), &content[65536..]);
        }
        other => panic!("expected piece, got {other:?}"),
    }
}

#[tokio::test]
async fn test_seed_drops_peer_with_wrong_file_hash() {
    let temp = TempDir::new().unwrap();
    let content = patterned(50_000);
    let (_, seed_port) = spawn_seed(&temp, &content).await;

    let mut peer = RawPeer::connect(seed_port).await;
    peer.writer
        .send(&Message::Handshake {
            id: peer.id,
            file_name: Some("other.dat".to_string()),
            file_size: Some(50_000),
            file_hash: Some("0000000000000000000000000000000000000000".to_string()),
            piece_size: Some(65536),
            port: 1,
        })
        .await
        .unwrap();

    peer.expect_closed().await;
}

#[tokio::test]
async fn test_connection_carrying_our_own_id_is_dropped() {
    let temp = TempDir::new().unwrap();
    let content = patterned(1_000);
    let path = temp.path().join("seed.dat");
    tokio::fs::write(&path, &content).await.unwrap();

    let seed = Node::bind(config(path, None)).await.unwrap();
    let seed_id = seed.id();
    let seed_port = seed.port();
    tokio::spawn(seed.run());

    let mut peer = RawPeer::connect(seed_port).await;
    peer.send_handshake_as(seed_id).await;

    peer.expect_closed().await;
}

#[tokio::test]
async fn test_two_leechers_without_metadata_disconnect() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("dest.dat");

    let leecher = Node::bind(config(dest, None)).await.unwrap();
    let port = leecher.port();
    tokio::spawn(leecher.run());

    let mut peer = RawPeer::connect(port).await;
    peer.send_empty_handshake().await;

    peer.expect_closed().await;
}

#[tokio::test]
async fn test_inbound_peers_are_exchanged() {
    let temp = TempDir::new().unwrap();
    let content = patterned(10_000);
    let (_, seed_port) = spawn_seed(&temp, &content).await;

    let mut first = RawPeer::connect(seed_port).await;
    first.send_empty_handshake().await;
    assert!(matches!(first.next().await, Message::Handshake { .. }));
    assert!(matches!(first.next().await, Message::Bitfield { .. }));

    let mut second = RawPeer::connect(seed_port).await;
    second.send_empty_handshake().await;
    assert!(matches!(second.next().await, Message::Handshake { .. }));
    assert!(matches!(second.next().await, Message::Bitfield { .. }));

    // The newcomer is told about the first peer...
    match second.next().await {
        Message::Peers { peers } => {
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].id, first.id);
            assert_eq!(peers[0].port, 1);
        }
        other => panic!("expected peers, got {other:?}"),
    }

    // ...and the first peer is told about the newcomer.
    match first.next().await {
        Message::Peers { peers } => {
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].id, second.id);
        }
        other => panic!("expected peers, got {other:?}"),
    }
}

#[tokio::test]
async fn test_leecher_reissues_requests_after_a_peer_drop() {
    let temp = TempDir::new().unwrap();
    let content = patterned(140_000);

    // A scripted seed that accepts one leecher, serves a single piece, and
    // then vanishes mid-transfer.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let flaky_port = listener.local_addr().unwrap().port();
    let flaky_content = content.clone();
    let (real_seed_tx, real_seed_rx) = tokio::sync::oneshot::channel::<u16>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let mut reader = MessageReader::new(read_half);
        let mut writer = MessageWriter::new(write_half);

        // Answer the leecher's handshake with full metadata.
        let leecher_hs = reader.next().await.unwrap();
        assert!(matches!(leecher_hs, Message::Handshake { .. }));
        writer
            .send(&Message::Handshake {
                id: NodeId::generate(),
                file_name: Some("flaky.dat".to_string()),
                file_size: Some(flaky_content.len() as u64),
                file_hash: Some(sha1_hex(&flaky_content)),
                piece_size: Some(65536),
                port: 1,
            })
            .await
            .unwrap();
        // Hold everything, serve one request, then drop the connection.
        writer
            .send(&Message::Bitfield {
                pieces: vec![0, 1, 2],
            })
            .await
            .unwrap();
        let request = reader.next().await.unwrap();
        let Message::Request { index } = request else {
            panic!("expected request, got {request:?}");
        };
        let start = index as usize * 65536;
        let end = (start + 65536).min(flaky_content.len());
        writer
            .send(&Message::piece(index, &flaky_content[start..end]))
            .await
            .unwrap();
        let _ = reader.next().await;

        // Gossip a real seed to the leecher before disappearing, so the
        // cleared requests have somewhere to go.
        let port = real_seed_rx.await.unwrap();
        writer
            .send(&Message::Peers {
                peers: vec![crate::pex::PexPeer::new(
                    NodeId::from_hex("0000000000000000").unwrap(),
                    "127.0.0.1",
                    port,
                )],
            })
            .await
            .unwrap();
    });

    let dest = temp.path().join("dest.dat");
    let leecher = Node::bind(config(dest.clone(), Some(format!("127.0.0.1:{flaky_port}"))))
        .await
        .unwrap();
    tokio::spawn(leecher.run());

    let (_, seed_port) = spawn_seed(&temp, &content).await;
    real_seed_tx.send(seed_port).unwrap();

    wait_for_file(&dest, &content).await;
}

#[tokio::test]
async fn test_wrong_hash_peer_is_not_remembered() {
    let temp = TempDir::new().unwrap();
    let content = patterned(5_000);
    let (_, seed_port) = spawn_seed(&temp, &content).await;

    let mut bad = RawPeer::connect(seed_port).await;
    bad.writer
        .send(&Message::Handshake {
            id: bad.id,
            file_name: None,
            file_size: Some(5_000),
            file_hash: Some("1111111111111111111111111111111111111111".to_string()),
            piece_size: Some(5_000),
            port: 1,
        })
        .await
        .unwrap();
    bad.expect_closed().await;

    // A later well-behaved peer sees no trace of the rejected one.
    let mut good = RawPeer::connect(seed_port).await;
    good.send_empty_handshake().await;
    assert!(matches!(good.next().await, Message::Handshake { .. }));
    assert!(matches!(good.next().await, Message::Bitfield { .. }));

    good.writer.send(&Message::Request { index: 0 }).await.unwrap();
    assert!(matches!(good.next().await, Message::Piece { index: 0, .. }));
}
