//! UDP endpoints for one ring node.
//!
//! Each node binds a receive socket on its own port and a second socket
//! connected to its successor. Receives are non-blocking; the runtime
//! checks readiness before reading.
//!
//! A datagram is read whole and then handed out in reader-sized chunks,
//! so a small read size never truncates a large datagram.

use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use tokenring_core::{ChunkSource, Frame};

/// Largest UDP payload over IPv4.
const MAX_DATAGRAM: usize = 65_507;

/// Socket the predecessor sends to.
pub struct RecvEndpoint {
    socket: UdpSocket,
    datagram: Vec<u8>,
    /// Unread part of the last datagram: `datagram[pos..end]`.
    pos: usize,
    end: usize,
}

impl RecvEndpoint {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("failed to bind receive endpoint {addr}"))?;
        Ok(Self {
            socket,
            datagram: vec![0u8; MAX_DATAGRAM],
            pos: 0,
            end: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Wait until a read would not block.
    pub async fn readable(&self) -> io::Result<()> {
        self.socket.readable().await
    }
}

impl ChunkSource for RecvEndpoint {
    fn try_recv_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.end {
            // Empty datagrams carry nothing; UDP has no end of stream.
            self.end = self.socket.try_recv(&mut self.datagram)?;
            self.pos = 0;
        }
        let n = buf.len().min(self.end - self.pos);
        buf[..n].copy_from_slice(&self.datagram[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Socket connected to the successor.
pub struct SendEndpoint {
    socket: UdpSocket,
    successor: SocketAddr,
}

impl SendEndpoint {
    pub async fn connect(successor: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if successor.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let socket = UdpSocket::bind(local)
            .await
            .context("failed to bind send endpoint")?;
        socket
            .connect(successor)
            .await
            .with_context(|| format!("failed to connect to successor {successor}"))?;
        Ok(Self { socket, successor })
    }

    pub fn successor(&self) -> SocketAddr {
        self.successor
    }

    /// Encode and transmit one frame.
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.to_bytes()?;
        let n = self
            .socket
            .send(&bytes)
            .await
            .with_context(|| format!("send to {} failed", self.successor))?;
        tracing::trace!(to = %self.successor, command = frame.command, bytes = n, "frame sent");
        Ok(())
    }
}

/// Send one frame from a throwaway socket. Used to seed the token.
pub async fn send_once(target: SocketAddr, frame: &Frame) -> Result<()> {
    SendEndpoint::connect(target).await?.send_frame(frame).await
}
