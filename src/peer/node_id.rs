use std::fmt;

use rand::Rng as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A node's identity: 8 random bytes, written as 16 lowercase hex characters.
///
/// Ids double as the tie-breaker for connection initiation: byte-wise
/// ordering (which equals lexicographic ordering of the hex form) decides
/// which side of a peer pair dials.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; 8]);

impl NodeId {
    pub fn generate() -> Self {
        let mut id = [0u8; 8];
        rand::rng().fill(&mut id[..]);
        Self(id)
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Parses the 16-hex-character wire form.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 || !s.is_ascii() {
            return None;
        }
        let mut id = [0u8; 8];
        for (i, byte) in id.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// The initiation rule: for any pair of distinct ids, exactly one side
    /// dials and the other waits, so a pair never ends up with duplicate
    /// connections from a simultaneous dial.
    pub fn should_initiate(&self, other: &NodeId) -> bool {
        self > other
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NodeId::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid node id: {s:?}")))
    }
}
