//! Node state machine, free of I/O.
//!
//! The runtime feeds received frames in and pulls frames to send out. All
//! queues live here so the round semantics can be tested without sockets:
//!
//! - `forward_queue`: frames to relay to the successor, FIFO.
//! - `pending_events`: frames observed since the last token catch.
//! - `committed_batch`: what the last catch cut from `pending_events`;
//!   drained whole by `apply`.

use std::collections::VecDeque;
use std::mem;
use std::time::{Duration, Instant, SystemTime};

use tokenring_core::{split_signed, Command, Frame, NodeId};

use crate::dispatch::HandlerTable;
use crate::world::World;

/// What the runtime must do with a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Token caught. The runtime must commit and relay before anything else.
    Token,
    /// Queued for forwarding and for the next commit.
    Queued,
}

/// Result of a token catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catch {
    /// Time since the previous catch. None on the first.
    pub round_trip: Option<Duration>,
    /// Events moved into the committed batch.
    pub committed: usize,
}

/// Monotonic counters, published for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub token_catches: u64,
    pub forwarded: u64,
    pub suppressed: u64,
    pub applied: u64,
}

pub struct NodeState {
    id: NodeId,
    forward_queue: VecDeque<Frame>,
    pending_events: Vec<Frame>,
    committed_batch: VecDeque<Frame>,
    world: World,
    handlers: HandlerTable,
    has_token: bool,
    last_token_time: Option<SystemTime>,
    last_catch: Option<Instant>,
    counters: Counters,
}

impl NodeState {
    pub fn new(id: NodeId, handlers: HandlerTable) -> Self {
        Self {
            id,
            forward_queue: VecDeque::new(),
            pending_events: Vec::new(),
            committed_batch: VecDeque::new(),
            world: World::new(),
            handlers,
            has_token: false,
            last_token_time: None,
            last_catch: None,
            counters: Counters::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Route a frame received from the predecessor.
    pub fn receive(&mut self, frame: Frame) -> Route {
        match Command::from(frame.command) {
            Command::Token => Route::Token,
            Command::Move | Command::Other(_) => {
                self.forward_queue.push_back(frame.clone());
                self.pending_events.push(frame);
                Route::Queued
            }
        }
    }

    /// Token caught: cut the current round.
    ///
    /// Everything observed since the previous catch becomes the committed
    /// batch. The caller calls `release_token` and then relays the token,
    /// so no two nodes ever hold it at once.
    pub fn catch_token(&mut self, wall: SystemTime, now: Instant) -> Catch {
        self.has_token = true;
        let round_trip = self.last_catch.map(|prev| now.saturating_duration_since(prev));
        self.last_catch = Some(now);
        self.last_token_time = Some(wall);
        self.counters.token_catches += 1;

        if !self.committed_batch.is_empty() {
            tracing::debug!(
                node = %self.id,
                stale = self.committed_batch.len(),
                "committed batch replaced before it was applied"
            );
        }
        self.committed_batch = mem::take(&mut self.pending_events).into();

        Catch {
            round_trip,
            committed: self.committed_batch.len(),
        }
    }

    pub fn release_token(&mut self) {
        self.has_token = false;
    }

    /// Frames to relay, oldest first. Frames this node signed have been all
    /// the way around and are dropped here.
    pub fn drain_forward(&mut self) -> Vec<Frame> {
        let mut out = Vec::with_capacity(self.forward_queue.len());
        while let Some(frame) = self.forward_queue.pop_front() {
            let (origin, _) = split_signed(&frame.args);
            if origin.is_from(self.id) {
                tracing::debug!(node = %self.id, command = frame.command, "own message returned, not forwarding");
                self.counters.suppressed += 1;
                continue;
            }
            self.counters.forwarded += 1;
            out.push(frame);
        }
        out
    }

    /// Build the frame for a locally injected command, signed by this node.
    pub fn sign_local(&self, command: u8, raw_args: &[u8]) -> Frame {
        Frame::new(command, self.id.sign(raw_args))
    }

    /// Apply the whole committed batch to the world. Returns the number of
    /// events applied.
    pub fn apply(&mut self) -> usize {
        let mut applied = 0;
        while let Some(frame) = self.committed_batch.pop_front() {
            let (origin, payload) = split_signed(&frame.args);
            self.world.entry(origin);
            self.handlers
                .dispatch(Command::from(frame.command), origin, payload, &mut self.world);
            applied += 1;
        }
        self.counters.applied += applied as u64;
        applied
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn has_token(&self) -> bool {
        self.has_token
    }

    pub fn last_token_time(&self) -> Option<SystemTime> {
        self.last_token_time
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn pending_len(&self) -> usize {
        self.pending_events.len()
    }

    pub fn committed_len(&self) -> usize {
        self.committed_batch.len()
    }

    pub fn forward_len(&self) -> usize {
        self.forward_queue.len()
    }
}
