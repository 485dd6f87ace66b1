//! Discrete-event simulation engine for distributed protocols.
//!
//! The engine models a population of nodes exchanging typed messages. A
//! [`HardwareManager`] owns every node, routes messages into per-node
//! inboxes (immediate FIFO plus a delayed min-heap) and drives the node
//! state machines from a fixed worker pool until the driver stops it.
//!
//! # Architecture
//!
//! ```text
//! driver ── add_node / gen_message / run / stop ──▶ HardwareManager
//!                                                      │ ready queue
//!                                                      ▼
//!                                                   workers ── handler lock ──▶ NodeBehavior
//!                                                      ▲                           │
//!                                                      └────── send_message ◀──────┘
//! ```
//!
//! Guarantees:
//!
//! - a node's hooks run under its handler lock: at most one worker at a time;
//! - same-node immediate messages keep FIFO order, delayed messages deliver
//!   in earliest-due order;
//! - no ordering exists across different destination nodes;
//! - message hop counts reflect `send_message` traversals only.
//!
//! Protocols implement [`NodeBehavior`] and talk back to the dispatcher
//! through the object-safe [`Network`] handle they receive in every hook.

mod counters;
mod error;
mod manager;
mod message;
mod node;
mod topology;
mod traits;

pub use counters::{all_messages, queued_messages};
pub use error::EngineError;
pub use manager::{GraphHardwareManager, HardwareManager};
pub use message::Message;
pub use topology::{AdjacencyGraph, FullMesh, Topology};
pub use traits::{AcceptAll, AdmissionGate, Network, NodeBehavior, Payload};

/// Node identifier, unique within one dispatcher.
pub type NodeId = u64;
