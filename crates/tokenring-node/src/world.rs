//! World replica — each node's own view of every participant's position.
//!
//! The node loop owns a `World` and is its only writer. Collaborators read a
//! `WorldView`, a concurrent copy the loop refreshes after applying events.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use tokenring_core::{Signature, Vector};

/// Positions keyed by origin signature. Entries appear on first observation.
#[derive(Debug, Clone, Default)]
pub struct World {
    positions: HashMap<Signature, Vector>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of `origin`, created at the origin if never seen.
    pub fn entry(&mut self, origin: Signature) -> &mut Vector {
        self.positions.entry(origin).or_insert(Vector::ORIGIN)
    }

    pub fn get(&self, origin: &Signature) -> Option<Vector> {
        self.positions.get(origin).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Signature, &Vector)> {
        self.positions.iter()
    }
}

/// Read-only, shareable copy of a node's world. Written only by the node
/// loop; any thread may snapshot it.
pub type WorldView = Arc<DashMap<Signature, Vector>>;

pub fn new_view() -> WorldView {
    Arc::new(DashMap::new())
}

/// Copy every entry of `world` into `view`.
pub fn publish(world: &World, view: &WorldView) {
    for (origin, position) in world.iter() {
        view.insert(*origin, *position);
    }
}

/// Ordered copy of a view, for display.
pub fn snapshot(view: &WorldView) -> BTreeMap<Signature, Vector> {
    view.iter().map(|e| (*e.key(), *e.value())).collect()
}
