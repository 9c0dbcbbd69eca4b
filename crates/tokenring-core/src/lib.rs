//! tokenring-core — wire format, frame codec, command vocabulary and
//! configuration shared by every token ring crate.

pub mod codec;
pub mod command;
pub mod config;
pub mod identity;
pub mod wire;

pub use codec::{ChunkSource, FrameDecoder, FrameReader, RecvError};
pub use command::{Command, Direction, Vector, MOVE, TOKEN};
pub use identity::{split_signed, NodeId, Signature};
pub use wire::{encode, encode_text, Frame, WireError};
