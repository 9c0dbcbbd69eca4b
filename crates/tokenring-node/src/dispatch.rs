//! Routes committed events to the handler registered for their command.

use std::collections::HashMap;
use std::sync::Arc;

use tokenring_core::command::move_delta;
use tokenring_core::{Command, Signature};

use crate::world::World;

/// Applies one event's payload to the world on behalf of `origin`.
pub type Handler = Arc<dyn Fn(Signature, &[u8], &mut World) + Send + Sync>;

/// Maps commands to handlers. Commands without a handler are inert when
/// applied; nodes still relay them.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<Command, Handler>,
}

impl HandlerTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard vocabulary: MOVE.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register(Command::Move, Arc::new(apply_move));
        table
    }

    /// Register a handler, replacing any previous one for `command`.
    pub fn register(&mut self, command: Command, handler: Handler) {
        self.handlers.insert(command, handler);
    }

    pub fn handles(&self, command: Command) -> bool {
        self.handlers.contains_key(&command)
    }

    /// Apply an event. Returns false if no handler is registered for `command`.
    pub fn dispatch(&self, command: Command, origin: Signature, payload: &[u8], world: &mut World) -> bool {
        match self.handlers.get(&command) {
            Some(handler) => {
                handler(origin, payload, world);
                true
            }
            None => {
                tracing::debug!(command = u8::from(command), %origin, payload = %hex::encode(payload), "no handler, event inert");
                false
            }
        }
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<u8> = self.handlers.keys().map(|&c| u8::from(c)).collect();
        codes.sort_unstable();
        f.debug_struct("HandlerTable").field("codes", &codes).finish()
    }
}

/// MOVE: shift the origin's position by the pressed direction keys.
pub fn apply_move(origin: Signature, payload: &[u8], world: &mut World) {
    let position = world.entry(origin);
    *position = position.offset(move_delta(payload));
}
