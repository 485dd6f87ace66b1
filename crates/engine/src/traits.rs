//! Handler-facing traits.
//!
//! Node behaviors never see the concrete dispatcher type. Every hook receives
//! a `&dyn Network<T>` handle, which carries exactly the operations a running
//! protocol may perform: sending, topology queries and id lookups. Structural
//! mutation (adding or failing nodes, wiring edges, starting and stopping the
//! worker pool) stays on the concrete manager and is reserved for the driver.

use crate::{EngineError, Message, NodeId};

/// Marker bounds for message payloads.
pub trait Payload: Clone + Default + Send + 'static {}

impl<T: Clone + Default + Send + 'static> Payload for T {}

/// The dispatcher as seen from inside a node handler.
pub trait Network<T: Payload>: Send + Sync {
    /// Forward a message from `src` to `dst`.
    ///
    /// Increments the hop count, honors the message delay, and wakes a
    /// worker for the destination. Fails if either endpoint is unknown or
    /// the topology forbids the link. A configured link-failure probability
    /// may silently drop the message; that is not an error.
    fn send_message(&self, src: NodeId, dst: NodeId, msg: Message<T>) -> Result<(), EngineError>;

    /// Topology oracle: may `a` send directly to `b`?
    fn can_send(&self, a: NodeId, b: NodeId) -> bool;

    /// Snapshot of `n`'s neighbours.
    fn neighbours(&self, n: NodeId) -> Vec<NodeId>;

    /// Visit `n`'s neighbours until the callback returns `false`.
    fn iter_neighbours(&self, n: NodeId, cb: &mut dyn FnMut(NodeId) -> bool);

    fn count_neighbours(&self, n: NodeId) -> usize;

    /// Is any node registered with id `>= i`?
    fn has_bigger_id(&self, i: NodeId) -> bool;

    /// Smallest registered id `>= i`.
    fn next_id(&self, i: NodeId) -> Result<NodeId, EngineError>;

    /// An arbitrary registered node, chosen uniformly at random.
    fn random_node(&self) -> Result<NodeId, EngineError>;

    /// Number of registered nodes.
    fn node_count(&self) -> usize;
}

/// A node's protocol state machine.
///
/// The dispatcher guarantees that at most one thread runs any of these hooks
/// for a given node at a time (the handler lock). Hooks receive the network
/// handle and may send messages through it; errors are logged by the worker
/// loop and do not evict the node.
pub trait NodeBehavior<T: Payload>: Send {
    /// Called once, after the node is inserted into the registry.
    fn init(&mut self, _net: &dyn Network<T>) -> Result<(), EngineError> {
        Ok(())
    }

    /// Originate a message at this node. Invoked by the driver through
    /// `gen_message`; the hop count is not incremented.
    fn start_message(&mut self, net: &dyn Network<T>, msg: Message<T>) -> Result<(), EngineError>;

    /// Consume one delivered message.
    fn handle_message(&mut self, net: &dyn Network<T>, msg: Message<T>) -> Result<(), EngineError>;
}

/// Inbox admission hook.
///
/// Consulted under the inbox lock (never the handler lock) before a message
/// is enqueued; a rejected message is silently lost.
pub trait AdmissionGate<T: Payload>: Send + Sync {
    fn admit(&self, msg: &Message<T>) -> bool;
}

/// Default gate: every message is admitted.
pub struct AcceptAll;

impl<T: Payload> AdmissionGate<T> for AcceptAll {
    fn admit(&self, _msg: &Message<T>) -> bool {
        true
    }
}
