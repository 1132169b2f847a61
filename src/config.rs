//! Command-line configuration surface.

use std::path::PathBuf;

use clap::Parser;

use crate::node::NodeError;

/// A trackerless peer-to-peer file distribution node.
///
/// With an existing `--file` the node seeds it; otherwise the path is the
/// destination of a download bootstrapped through `--peer` or an inbound
/// connection.
#[derive(Debug, Clone, Parser)]
#[command(name = "shoal", version)]
pub struct NodeConfig {
    /// TCP port to listen on.
    #[arg(long)]
    pub port: u16,

    /// File to share, or the destination path to download into.
    #[arg(long)]
    pub file: PathBuf,

    /// Initial peer to dial, as host:port.
    #[arg(long)]
    pub peer: Option<String>,
}

/// Splits a `host:port` peer address at the last colon, so hostnames, IPv4
/// and (bracketed) IPv6 literals all work.
pub fn parse_peer_addr(addr: &str) -> Result<(String, u16), NodeError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| NodeError::InvalidPeerAddress(addr.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(NodeError::InvalidPeerAddress(addr.to_string()));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| NodeError::InvalidPeerAddress(addr.to_string()))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_peer_addr() {
        assert_eq!(
            parse_peer_addr("127.0.0.1:6881").unwrap(),
            ("127.0.0.1".to_string(), 6881)
        );
        assert_eq!(
            parse_peer_addr("seed.example.org:9000").unwrap(),
            ("seed.example.org".to_string(), 9000)
        );
        assert_eq!(
            parse_peer_addr("[::1]:6881").unwrap(),
            ("::1".to_string(), 6881)
        );
    }

    #[test]
    fn test_parse_peer_addr_rejects_garbage() {
        assert!(parse_peer_addr("no-port-here").is_err());
        assert!(parse_peer_addr(":6881").is_err());
        assert!(parse_peer_addr("host:notaport").is_err());
        assert!(parse_peer_addr("host:99999").is_err());
    }
}
