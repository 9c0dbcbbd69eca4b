//! Ring node runtime.
//!
//! A node is one task owning its sockets and its `NodeState`. Each pass of
//! the loop runs, in order:
//!
//!   1. receive: at most one frame; a token is committed and relayed at once
//!   2. forward: relay queued frames, dropping our own returning messages
//!   3. local:   sign and send commands injected by collaborators
//!   4. apply:   drain the committed batch into the world
//!   5. publish: refresh the read-only world view and status
//!
//! When a pass does no work the loop parks until the receive socket is
//! readable, a local command arrives or stop is requested.
//!
//! Collaborators only hold a `NodeHandle`: they can enqueue local commands
//! and read snapshots, never mutate the world.

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use tokenring_core::codec::DEFAULT_RECV_BUFFER;
use tokenring_core::{Frame, FrameReader, NodeId, RecvError, Signature, Vector};

use crate::dispatch::HandlerTable;
use crate::state::{Counters, NodeState, Route};
use crate::transport::{RecvEndpoint, SendEndpoint};
use crate::world::{self, WorldView};

/// Capacity of each node's event feed.
const EVENT_CAPACITY: usize = 4096;

// ── Public types ─────────────────────────────────────────────────────────────

/// A command waiting to be signed and sent.
#[derive(Debug, Clone)]
pub struct LocalCommand {
    pub command: u8,
    pub args: Bytes,
}

/// Notable moments in a node's life, for display and tests.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    TokenCaught {
        node: NodeId,
        at: Instant,
        round_trip: Option<Duration>,
        committed: usize,
    },
    Stopped {
        node: NodeId,
        error: Option<String>,
    },
}

/// Point-in-time status of a node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub running: bool,
    pub has_token: bool,
    pub last_token_time: Option<SystemTime>,
    pub token_catches: u64,
    pub forwarded: u64,
    pub suppressed: u64,
    pub applied: u64,
}

/// Tunables for one node.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// Bytes requested per read.
    pub recv_buffer: usize,
    pub handlers: HandlerTable,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            recv_buffer: DEFAULT_RECV_BUFFER,
            handlers: HandlerTable::with_defaults(),
        }
    }
}

// ── Shared state ─────────────────────────────────────────────────────────────

/// Everything collaborators may read. Written only by the node task.
struct Shared {
    id: NodeId,
    running: AtomicBool,
    has_token: AtomicBool,
    /// Microseconds since the Unix epoch. 0 = never caught.
    last_token_micros: AtomicU64,
    token_catches: AtomicU64,
    forwarded: AtomicU64,
    suppressed: AtomicU64,
    applied: AtomicU64,
    world: WorldView,
    events: broadcast::Sender<NodeEvent>,
}

impl Shared {
    fn new(id: NodeId) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id,
            running: AtomicBool::new(false),
            has_token: AtomicBool::new(false),
            last_token_micros: AtomicU64::new(0),
            token_catches: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            world: world::new_view(),
            events,
        }
    }

    fn store_counters(&self, c: Counters) {
        self.token_catches.store(c.token_catches, Ordering::Relaxed);
        self.forwarded.store(c.forwarded, Ordering::Relaxed);
        self.suppressed.store(c.suppressed, Ordering::Relaxed);
        self.applied.store(c.applied, Ordering::Relaxed);
    }

    fn store_last_token_time(&self, t: SystemTime) {
        let micros = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
            .max(1);
        self.last_token_micros.store(micros, Ordering::Release);
    }

    fn last_token_time(&self) -> Option<SystemTime> {
        match self.last_token_micros.load(Ordering::Acquire) {
            0 => None,
            micros => Some(UNIX_EPOCH + Duration::from_micros(micros)),
        }
    }

    fn emit(&self, event: NodeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Cheap, cloneable access to a node for display and input collaborators.
#[derive(Clone)]
pub struct NodeHandle {
    shared: Arc<Shared>,
    local_tx: mpsc::UnboundedSender<LocalCommand>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.shared.id
    }

    /// Queue a command for this node to sign and send to its successor.
    /// Safe to call from any thread.
    pub fn enqueue_local_command(&self, command: u8, args: impl Into<Bytes>) -> Result<()> {
        self.local_tx
            .send(LocalCommand {
                command,
                args: args.into(),
            })
            .map_err(|_| anyhow!("node {} is no longer accepting input", self.shared.id))
    }

    /// Copy of the node's current world.
    pub fn snapshot_world(&self) -> BTreeMap<Signature, Vector> {
        world::snapshot(&self.shared.world)
    }

    pub fn last_token_time(&self) -> Option<SystemTime> {
        self.shared.last_token_time()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn has_token(&self) -> bool {
        self.shared.has_token.load(Ordering::Acquire)
    }

    pub fn status(&self) -> NodeStatus {
        let s = &self.shared;
        NodeStatus {
            id: s.id,
            running: self.is_running(),
            has_token: self.has_token(),
            last_token_time: s.last_token_time(),
            token_catches: s.token_catches.load(Ordering::Relaxed),
            forwarded: s.forwarded.load(Ordering::Relaxed),
            suppressed: s.suppressed.load(Ordering::Relaxed),
            applied: s.applied.load(Ordering::Relaxed),
        }
    }

    /// Subscribe to this node's event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.shared.events.subscribe()
    }
}

// ── Node ─────────────────────────────────────────────────────────────────────

/// A ring member: bound endpoints plus, once started, its running task.
pub struct RingNode {
    handle: NodeHandle,
    runtime: Option<NodeRuntime>,
    task: Option<JoinHandle<Result<()>>>,
    shutdown: broadcast::Sender<()>,
}

impl RingNode {
    /// Bind `bind` for receiving and connect to `successor`.
    /// The node id is the bound port.
    pub async fn bind(bind: SocketAddr, successor: SocketAddr) -> Result<Self> {
        Self::bind_with(bind, successor, NodeSettings::default()).await
    }

    pub async fn bind_with(
        bind: SocketAddr,
        successor: SocketAddr,
        settings: NodeSettings,
    ) -> Result<Self> {
        let recv = RecvEndpoint::bind(bind).await?;
        let id = NodeId(recv.local_addr()?.port());
        let send = SendEndpoint::connect(successor).await?;
        tracing::info!(node = %id, %bind, %successor, "ring node bound");

        let shared = Arc::new(Shared::new(id));
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = broadcast::channel(1);

        let runtime = NodeRuntime {
            state: NodeState::new(id, settings.handlers),
            reader: FrameReader::with_chunk_size(settings.recv_buffer),
            recv,
            send,
            local_rx,
            local_open: true,
            local_backlog: VecDeque::new(),
            shared: shared.clone(),
        };

        Ok(Self {
            handle: NodeHandle { shared, local_tx },
            runtime: Some(runtime),
            task: None,
            shutdown,
        })
    }

    pub fn id(&self) -> NodeId {
        self.handle.id()
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// Spawn the node loop. A node starts at most once.
    pub fn start(&mut self) -> Result<()> {
        let Some(runtime) = self.runtime.take() else {
            bail!("node {} already started", self.id());
        };
        // The task clears this on exit.
        self.handle.shared.running.store(true, Ordering::Release);
        let shutdown = self.shutdown.subscribe();
        self.task = Some(tokio::spawn(runtime.run(shutdown)));
        Ok(())
    }

    /// Request loop termination and wait for it. Sockets are released when
    /// the loop returns. Returns the loop's fatal error, if it had one.
    pub async fn stop(&mut self) -> Result<()> {
        // Never started: dropping the runtime closes the sockets.
        self.runtime = None;
        let _ = self.shutdown.send(());
        match self.task.take() {
            Some(task) => task
                .await
                .with_context(|| format!("node {} task panicked", self.id()))?,
            None => Ok(()),
        }
    }

    pub fn enqueue_local_command(&self, command: u8, args: impl Into<Bytes>) -> Result<()> {
        self.handle.enqueue_local_command(command, args)
    }

    pub fn snapshot_world(&self) -> BTreeMap<Signature, Vector> {
        self.handle.snapshot_world()
    }

    pub fn last_token_time(&self) -> Option<SystemTime> {
        self.handle.last_token_time()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }
}

// ── Runtime loop ─────────────────────────────────────────────────────────────

struct NodeRuntime {
    state: NodeState,
    reader: FrameReader,
    recv: RecvEndpoint,
    send: SendEndpoint,
    local_rx: mpsc::UnboundedReceiver<LocalCommand>,
    /// False once every sender is gone.
    local_open: bool,
    /// Commands taken off the channel while parked, sent in step 3.
    local_backlog: VecDeque<LocalCommand>,
    shared: Arc<Shared>,
}

impl NodeRuntime {
    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let id = self.state.id();
        tracing::info!(node = %id, successor = %self.send.successor(), "ring node running");

        let result = self.work(&mut shutdown).await;

        self.shared.running.store(false, Ordering::Release);
        self.shared.has_token.store(false, Ordering::Release);
        match &result {
            Ok(()) => tracing::info!(node = %id, "ring node stopped"),
            Err(e) => tracing::error!(node = %id, error = %e, "ring node failed"),
        }
        self.shared.emit(NodeEvent::Stopped {
            node: id,
            error: result.as_ref().err().map(|e| format!("{e:#}")),
        });
        result
    }

    async fn work(&mut self, shutdown: &mut broadcast::Receiver<()>) -> Result<()> {
        loop {
            if stop_requested(shutdown) {
                return Ok(());
            }

            let mut busy = self.receive().await?;
            busy |= self.transfer_messages().await?;
            busy |= self.dispatch_local().await?;
            let applied = self.update_world();
            busy |= applied > 0;
            if busy {
                self.publish(applied > 0);
                // Other nodes may share this runtime.
                tokio::task::yield_now().await;
                continue;
            }

            if self.park(shutdown).await? {
                return Ok(());
            }
        }
    }

    /// Step 1.
    async fn receive(&mut self) -> Result<bool> {
        let frame = match self.reader.poll_frame(&mut self.recv) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(false),
            Err(RecvError::PeerDisconnected) => bail!("receive endpoint disconnected"),
            Err(e) => return Err(e).context("receive failed"),
        };

        tracing::debug!(node = %self.state.id(), command = frame.command, len = frame.args.len(), "frame received");
        if self.state.receive(frame) == Route::Token {
            self.commit_and_relay().await?;
        }
        Ok(true)
    }

    /// Token catch: cut the round, then relay the token before any other send.
    async fn commit_and_relay(&mut self) -> Result<()> {
        let id = self.state.id();
        self.shared.has_token.store(true, Ordering::Release);

        let now = Instant::now();
        let catch = self.state.catch_token(SystemTime::now(), now);
        // Released before the relay: at most one holder at any instant.
        self.state.release_token();
        self.shared.has_token.store(false, Ordering::Release);
        self.send
            .send_frame(&Frame::token())
            .await
            .context("failed to relay token")?;

        if let Some(t) = self.state.last_token_time() {
            self.shared.store_last_token_time(t);
        }
        match catch.round_trip {
            Some(rtt) => tracing::debug!(node = %id, rtt_us = rtt.as_micros() as u64, committed = catch.committed, "token caught"),
            None => tracing::debug!(node = %id, committed = catch.committed, "token caught for the first time"),
        }
        self.shared.emit(NodeEvent::TokenCaught {
            node: id,
            at: now,
            round_trip: catch.round_trip,
            committed: catch.committed,
        });
        Ok(())
    }

    /// Step 2.
    async fn transfer_messages(&mut self) -> Result<bool> {
        let frames = self.state.drain_forward();
        for frame in &frames {
            self.send.send_frame(frame).await.context("failed to forward")?;
        }
        Ok(!frames.is_empty())
    }

    /// Step 3.
    async fn dispatch_local(&mut self) -> Result<bool> {
        while let Ok(cmd) = self.local_rx.try_recv() {
            self.local_backlog.push_back(cmd);
        }
        let sent = !self.local_backlog.is_empty();
        while let Some(cmd) = self.local_backlog.pop_front() {
            let frame = self.state.sign_local(cmd.command, &cmd.args);
            self.send
                .send_frame(&frame)
                .await
                .context("failed to send local command")?;
            tracing::debug!(node = %self.state.id(), command = cmd.command, "local command sent");
        }
        Ok(sent)
    }

    /// Step 4.
    fn update_world(&mut self) -> usize {
        self.state.apply()
    }

    /// Step 5.
    fn publish(&self, world_changed: bool) {
        if world_changed {
            world::publish(self.state.world(), &self.shared.world);
        }
        self.shared.store_counters(self.state.counters());
    }

    /// Wait for work. Returns true if stop was requested.
    async fn park(&mut self, shutdown: &mut broadcast::Receiver<()>) -> Result<bool> {
        if self.reader.has_ready() {
            return Ok(false);
        }
        tokio::select! {
            _ = shutdown.recv() => Ok(true),
            r = self.recv.readable() => {
                r.context("receive endpoint failed")?;
                Ok(false)
            }
            cmd = self.local_rx.recv(), if self.local_open => {
                match cmd {
                    Some(cmd) => self.local_backlog.push_back(cmd),
                    None => self.local_open = false,
                }
                Ok(false)
            }
        }
    }
}

fn stop_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    use broadcast::error::TryRecvError;
    match shutdown.try_recv() {
        Err(TryRecvError::Empty) => false,
        Ok(()) | Err(TryRecvError::Closed) | Err(TryRecvError::Lagged(_)) => true,
    }
}
