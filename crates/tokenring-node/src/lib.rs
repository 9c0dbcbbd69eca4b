//! tokenring-node — the ring node runtime and ring bootstrap.

pub mod coordinator;
pub mod dispatch;
pub mod node;
pub mod state;
pub mod transport;
pub mod world;

pub use coordinator::{inject_token, ring_topology, Ring};
pub use dispatch::{Handler, HandlerTable};
pub use node::{LocalCommand, NodeEvent, NodeHandle, NodeSettings, NodeStatus, RingNode};
pub use world::{World, WorldView};
