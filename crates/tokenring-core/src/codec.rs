//! Per-connection frame decoding over unaligned byte chunks.
//!
//! The transport gives no framing guarantees: one read may hold half a
//! frame, several frames, or garbage followed by a frame. A `FrameDecoder`
//! owns all buffering state for exactly one connection (the trailing
//! fragment and the queue of decoded-but-undelivered frames), so decoders
//! for different connections never interfere.
//!
//! Decoding is length-first: the decoder locates a marker, reads the header,
//! then consumes exactly `length` argument bytes. Marker bytes inside a
//! well-formed payload do not misalign the stream. Bytes that precede a
//! marker are skipped and counted. Given the same byte stream, the same
//! frames come out no matter how the stream was chunked.
//!
//! The cost of trusting the length: a stray header whose arguments never
//! arrive holds everything behind it, the token included, as its payload
//! until `length` bytes have accumulated. Only lengths above `MAX_ARGS` are
//! rejected outright.

use std::collections::VecDeque;
use std::io;

use bytes::BytesMut;
use zerocopy::FromBytes;

use crate::wire::{Frame, FrameHeader, HEADER_SIZE, MARKER, MAX_ARGS};

/// Default size of a single read from the transport.
pub const DEFAULT_RECV_BUFFER: usize = 1024;

// ── Decoder ───────────────────────────────────────────────────────────────────

/// Accumulates bytes and extracts complete frames in stream order.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes not yet consumed by a complete frame.
    buffer: BytesMut,
    /// Complete frames awaiting delivery, oldest first.
    ready: VecDeque<Frame>,
    /// Bytes skipped while searching for a marker.
    discarded: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk from the transport. Complete frames become available
    /// through `next_frame`; an incomplete tail is kept for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.extract();
    }

    /// Oldest decoded frame, if any.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.ready.pop_front()
    }

    /// Number of decoded frames not yet delivered.
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Number of bytes held as an incomplete fragment.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes skipped during resynchronisation.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    fn extract(&mut self) {
        loop {
            match find_marker(&self.buffer) {
                Some(0) => {}
                Some(pos) => self.skip(pos),
                None => {
                    // A lone trailing marker byte may be the first half of
                    // the next marker.
                    let keep = usize::from(self.buffer.last() == Some(&MARKER[0]));
                    let garbage = self.buffer.len() - keep;
                    if garbage > 0 {
                        self.skip(garbage);
                    }
                    return;
                }
            }

            let Some(header) = FrameHeader::read_from_prefix(&self.buffer[..]) else {
                // Marker found but the header is still in flight.
                return;
            };
            let length = header.length as usize;
            let command = header.command;

            if length > MAX_ARGS {
                tracing::warn!(length, "declared length exceeds maximum, treating marker as noise");
                self.skip(1);
                continue;
            }

            let total = HEADER_SIZE + length;
            if self.buffer.len() < total {
                return;
            }

            let mut raw = self.buffer.split_to(total);
            let args = raw.split_off(HEADER_SIZE).freeze();
            self.ready.push_back(Frame { command, args });
        }
    }

    fn skip(&mut self, n: usize) {
        tracing::warn!(bytes = n, "discarding bytes outside a frame");
        let _ = self.buffer.split_to(n);
        self.discarded += n as u64;
    }
}

fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(MARKER.len()).position(|w| w == MARKER)
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// A non-blocking source of byte chunks, typically one receive endpoint.
///
/// `try_recv_chunk` must return `ErrorKind::WouldBlock` when nothing is
/// ready, and `Ok(0)` only when the peer is gone.
pub trait ChunkSource {
    fn try_recv_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Errors surfaced while receiving frames.
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error("peer disconnected")]
    PeerDisconnected,

    #[error("receive failed: {0}")]
    Io(#[from] io::Error),
}

/// Binds a `FrameDecoder` to reads from one `ChunkSource`.
#[derive(Debug)]
pub struct FrameReader {
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_RECV_BUFFER)
    }

    /// `chunk_size` bounds a single read from the source.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            chunk: vec![0u8; chunk_size.max(1)],
        }
    }

    /// Return the next frame without blocking.
    ///
    /// Queued frames are delivered first. Otherwise the source is read until
    /// a frame completes or nothing more is ready, in which case `Ok(None)`
    /// is returned and any partial frame stays buffered.
    pub fn poll_frame<S: ChunkSource>(&mut self, source: &mut S) -> Result<Option<Frame>, RecvError> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(Some(frame));
            }
            match source.try_recv_chunk(&mut self.chunk) {
                Ok(0) => return Err(RecvError::PeerDisconnected),
                Ok(n) => self.decoder.push(&self.chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RecvError::Io(e)),
            }
        }
    }

    /// True when decoded frames are waiting and no read is needed.
    pub fn has_ready(&self) -> bool {
        self.decoder.ready_len() > 0
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
