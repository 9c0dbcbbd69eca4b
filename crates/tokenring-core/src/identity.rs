//! Node identity and message signatures.
//!
//! A node's id is the port its receive endpoint binds to. The same id,
//! written as two big-endian bytes at the front of a message's arguments,
//! is the message's origin signature. A node recognises its own messages
//! when they come back around the ring by comparing that prefix.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize, Serializer};

/// Width of an origin signature on the wire.
pub const SIGNATURE_LEN: usize = 2;

/// A ring member's identity. Doubles as its receive port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u16);

impl NodeId {
    pub fn to_bytes(self) -> [u8; SIGNATURE_LEN] {
        self.0.to_be_bytes()
    }

    pub fn port(self) -> u16 {
        self.0
    }

    /// Prefix `payload` with this node's signature.
    pub fn sign(self, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(SIGNATURE_LEN + payload.len());
        out.put_slice(&self.to_bytes());
        out.put_slice(payload);
        out.freeze()
    }
}

impl From<u16> for NodeId {
    fn from(port: u16) -> Self {
        NodeId(port)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Origin of a message as read from its arguments.
///
/// Arguments shorter than `SIGNATURE_LEN` carry no usable signature and map
/// to `Signature::UNSIGNED`, which never matches any node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(Option<[u8; SIGNATURE_LEN]>);

impl Signature {
    pub const UNSIGNED: Signature = Signature(None);

    pub fn of(node: NodeId) -> Self {
        Signature(Some(node.to_bytes()))
    }

    /// Raw signature bytes. Empty when unsigned.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            Some(bytes) => &bytes[..],
            None => &[],
        }
    }

    /// True when `node` created the message carrying this signature.
    pub fn is_from(&self, node: NodeId) -> bool {
        self.0 == Some(node.to_bytes())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(bytes) => f.write_str(&hex::encode(bytes)),
            None => f.write_str("unsigned"),
        }
    }
}

// Serialized as its display form so it can key JSON maps.
impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Split signed arguments into origin and payload.
///
/// Too-short arguments are returned whole as the payload of an unsigned
/// message.
pub fn split_signed(args: &[u8]) -> (Signature, &[u8]) {
    match args {
        [a, b, payload @ ..] => (Signature(Some([*a, *b])), payload),
        _ => (Signature::UNSIGNED, args),
    }
}
