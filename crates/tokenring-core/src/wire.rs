//! Token ring wire format — the on-wire frame for all ring traffic.
//!
//! Every frame is `marker || length || command || args`:
//!
//! ```text
//!  0      2              6         7                7 + length
//!  +------+--------------+---------+------------------+
//!  | 0x55 | args length  | command | args             |
//!  | 0x55 | u32 (native) | 1 byte  | `length` bytes   |
//!  +------+--------------+---------+------------------+
//! ```
//!
//! The length field uses the platform's native byte order. All ring members
//! run on the same host class, so this is the platform-consistent order the
//! protocol has always used. Changing it is a breaking change.
//!
//! The header is `#[repr(C, packed)]` and uses zerocopy derives for
//! allocation-free serialization. There is no unsafe code in this module.

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::command::TOKEN;

// ── Frame Header ─────────────────────────────────────────────────────────────

/// Fixed-size prefix of every frame.
///
/// Wire size: 7 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// Always `MARKER`. Decoders resynchronise on this sequence.
    pub marker: [u8; 2],

    /// Length of the argument bytes following the command byte.
    /// Native byte order.
    pub length: u32,

    /// Command code. See `crate::command`.
    pub command: u8,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FrameHeader, [u8; 7]);

impl FrameHeader {
    pub fn new(command: u8, length: u32) -> Self {
        Self {
            marker: MARKER,
            length,
            command,
        }
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Frame start marker. Two identical bytes.
pub const MARKER: [u8; 2] = [0x55, 0x55];

/// Size of `FrameHeader` on the wire.
pub const HEADER_SIZE: usize = std::mem::size_of::<FrameHeader>();

/// Largest argument payload a frame may declare.
/// Matches the largest UDP payload over IPv4, so one frame always fits one
/// datagram. Decoders treat a larger declared length as a false marker.
pub const MAX_ARGS: usize = 65_507 - HEADER_SIZE;

// ── Frame ─────────────────────────────────────────────────────────────────────

/// A decoded message: one command byte and its argument bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub args: Bytes,
}

impl Frame {
    pub fn new(command: u8, args: impl Into<Bytes>) -> Self {
        Self {
            command,
            args: args.into(),
        }
    }

    /// The control token. Carries no arguments.
    pub fn token() -> Self {
        Self::new(TOKEN, Bytes::new())
    }

    pub fn is_token(&self) -> bool {
        self.command == TOKEN
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Result<Bytes, WireError> {
        encode_frame(self.command, &self.args)
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encode a command and its raw arguments.
///
/// `command` must be exactly one byte; anything else is `InvalidCommand`.
pub fn encode(command: &[u8], args: &[u8]) -> Result<Bytes, WireError> {
    match command {
        [code] => encode_frame(*code, args),
        other => Err(WireError::InvalidCommand(other.len())),
    }
}

/// Encode a command whose arguments are text. The text is sent as UTF-8.
pub fn encode_text(command: &[u8], args: &str) -> Result<Bytes, WireError> {
    encode(command, args.as_bytes())
}

fn encode_frame(command: u8, args: &[u8]) -> Result<Bytes, WireError> {
    if args.len() > MAX_ARGS {
        return Err(WireError::InvalidArgs(args.len()));
    }
    // Bounded by MAX_ARGS above.
    let header = FrameHeader::new(command, args.len() as u32);

    let mut out = BytesMut::with_capacity(HEADER_SIZE + args.len());
    out.put_slice(header.as_bytes());
    out.put_slice(args);
    Ok(out.freeze())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised when building frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("command must be exactly one byte, got {0}")]
    InvalidCommand(usize),

    #[error("argument payload of {0} bytes exceeds maximum {}", MAX_ARGS)]
    InvalidArgs(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
