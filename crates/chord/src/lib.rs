//! Chord-style greedy finger-table routing.
//!
//! Nodes live on a ring of `2^bits` positions; a node's id is its ring
//! position. A lookup message carries a target position and is routed
//! greedily: each node forwards to its farthest finger that does not
//! overshoot the target's successor, giving the expected `O(log n)` hop
//! count. Delivery completes at `successor(target)`, which invokes the
//! completion callback with the receiving node and the message.

use distsim_engine::{EngineError, Message, Network, NodeBehavior, NodeId};
use distsim_rng::{RngCore, Xoroshiro128Plus};
use std::sync::Arc;
use tracing::debug;

/// Invoked when a lookup reaches its successor node.
pub type CompletionCallback = Arc<dyn Fn(NodeId, &Message<u64>) + Send + Sync>;

/// One ring participant.
pub struct ChordNode {
    id: NodeId,
    bits: u32,
    rng: Xoroshiro128Plus,
    on_complete: CompletionCallback,
}

impl ChordNode {
    /// `bits` fixes the ring size at `2^bits`; `seed` makes the node's
    /// target draws reproducible.
    pub fn new(id: NodeId, bits: u32, seed: u64, on_complete: CompletionCallback) -> Self {
        Self {
            id,
            bits,
            rng: Xoroshiro128Plus::from_pair(id.wrapping_add(1), seed),
            on_complete,
        }
    }

    fn ring(&self) -> u64 {
        1u64 << self.bits
    }

    /// Clockwise distance from this node to `other` on the ring.
    fn distance(&self, other: u64) -> u64 {
        let other = other % self.ring();
        if other >= self.id {
            other - self.id
        } else {
            self.ring() + other - self.id
        }
    }

    /// The live node owning position `x`: smallest id `>= x mod 2^bits`,
    /// wrapping to the smallest id overall.
    fn successor(&self, net: &dyn Network<u64>, x: u64) -> Result<NodeId, EngineError> {
        let x = x % self.ring();
        if net.has_bigger_id(x) {
            net.next_id(x)
        } else {
            net.next_id(0)
        }
    }
}

impl NodeBehavior<u64> for ChordNode {
    /// Draw a target position owned by some other node and route the lookup
    /// locally; messages completing here keep zero hops.
    fn start_message(
        &mut self,
        net: &dyn Network<u64>,
        mut msg: Message<u64>,
    ) -> Result<(), EngineError> {
        let mut target = self.rng.next_u64() % self.ring();
        while self.successor(net, target)? == self.id {
            target = self.rng.next_u64() % self.ring();
        }
        *msg.payload_mut() = target;
        self.handle_message(net, msg)
    }

    /// One greedy routing step.
    fn handle_message(
        &mut self,
        net: &dyn Network<u64>,
        msg: Message<u64>,
    ) -> Result<(), EngineError> {
        let dst = self.successor(net, *msg.payload())?;
        if dst == self.id {
            (self.on_complete)(self.id, &msg);
            return Ok(());
        }
        let mut relay = None;
        for i in (1..=self.bits).rev() {
            let finger = self.successor(net, self.id.wrapping_add(1u64 << (i - 1)))?;
            if finger == self.id {
                continue;
            }
            if self.distance(finger) <= self.distance(dst) {
                relay = Some(finger);
                break;
            }
        }
        match relay {
            Some(finger) => net.send_message(self.id, finger, msg),
            None => {
                // Cannot happen on a ring with a reachable destination; the
                // 2^0 finger is the immediate successor.
                debug!(node = self.id, target = *msg.payload(), "no usable finger");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;

    /// Registry-only network stub: enough for successor queries, records
    /// sends instead of delivering them.
    struct RingStub {
        ids: BTreeSet<NodeId>,
        sent: Mutex<Vec<(NodeId, NodeId)>>,
    }

    impl RingStub {
        fn new(ids: &[NodeId]) -> Self {
            Self {
                ids: ids.iter().copied().collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl Network<u64> for RingStub {
        fn send_message(
            &self,
            src: NodeId,
            dst: NodeId,
            _msg: Message<u64>,
        ) -> Result<(), EngineError> {
            self.sent.lock().push((src, dst));
            Ok(())
        }

        fn can_send(&self, a: NodeId, b: NodeId) -> bool {
            a != b
        }

        fn neighbours(&self, n: NodeId) -> Vec<NodeId> {
            self.ids.iter().copied().filter(|&id| id != n).collect()
        }

        fn iter_neighbours(&self, n: NodeId, cb: &mut dyn FnMut(NodeId) -> bool) {
            for id in self.neighbours(n) {
                if !cb(id) {
                    break;
                }
            }
        }

        fn count_neighbours(&self, n: NodeId) -> usize {
            self.neighbours(n).len()
        }

        fn has_bigger_id(&self, i: NodeId) -> bool {
            self.ids.range(i..).next().is_some()
        }

        fn next_id(&self, i: NodeId) -> Result<NodeId, EngineError> {
            self.ids
                .range(i..)
                .next()
                .copied()
                .ok_or(EngineError::NoSuccessorId(i))
        }

        fn random_node(&self) -> Result<NodeId, EngineError> {
            self.ids.first().copied().ok_or(EngineError::EmptyRegistry)
        }

        fn node_count(&self) -> usize {
            self.ids.len()
        }
    }

    fn noop_callback() -> CompletionCallback {
        Arc::new(|_, _| {})
    }

    #[test]
    fn test_successor_definition() {
        let net = RingStub::new(&[4, 10, 50]);
        let node = ChordNode::new(4, 6, 1, noop_callback());
        // Smallest id >= target, wrapping past the largest id.
        assert_eq!(node.successor(&net, 3).unwrap(), 4);
        assert_eq!(node.successor(&net, 4).unwrap(), 4);
        assert_eq!(node.successor(&net, 5).unwrap(), 10);
        assert_eq!(node.successor(&net, 11).unwrap(), 50);
        assert_eq!(node.successor(&net, 51).unwrap(), 4);
        // Targets are reduced modulo the ring size (2^6).
        assert_eq!(node.successor(&net, 64 + 5).unwrap(), 10);
    }

    #[test]
    fn test_distance_wraps_modulo_ring() {
        let node = ChordNode::new(60, 6, 1, noop_callback());
        assert_eq!(node.distance(60), 0);
        assert_eq!(node.distance(63), 3);
        assert_eq!(node.distance(0), 4);
        assert_eq!(node.distance(59), 63);
    }

    #[test]
    fn test_completion_at_successor() {
        let net = RingStub::new(&[4, 10, 50]);
        let hits: Arc<Mutex<Vec<(NodeId, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        let cb: CompletionCallback = Arc::new(move |id, msg| {
            sink.lock().push((id, *msg.payload()));
        });
        let mut node = ChordNode::new(10, 6, 1, cb);
        // Target 7 is owned by node 10.
        node.handle_message(&net, Message::new(7)).unwrap();
        assert_eq!(*hits.lock(), vec![(10, 7)]);
        assert!(net.sent.lock().is_empty());
    }

    #[test]
    fn test_forwards_one_hop_toward_destination() {
        let net = RingStub::new(&[4, 10, 50]);
        let mut node = ChordNode::new(4, 6, 1, noop_callback());
        // Target 40 is owned by node 50; node 4 must relay, not complete.
        node.handle_message(&net, Message::new(40)).unwrap();
        let sent = net.sent.lock();
        assert_eq!(sent.len(), 1);
        let (src, dst) = sent[0];
        assert_eq!(src, 4);
        // The relay never overshoots the destination.
        let relay = ChordNode::new(4, 6, 1, noop_callback());
        assert!(relay.distance(dst) <= relay.distance(50));
        assert_ne!(dst, 4);
    }

    #[test]
    fn test_start_message_avoids_own_positions() {
        let net = RingStub::new(&[4, 10, 50]);
        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        let cb: CompletionCallback = Arc::new(move |id, msg| {
            sink.lock().push((id, *msg.payload()));
        });
        let mut node = ChordNode::new(10, 6, 1, cb);
        for _ in 0..50 {
            node.start_message(&net, Message::new(0)).unwrap();
        }
        // Local completions would mean the drawn target was our own range.
        assert!(hits.lock().is_empty());
        assert_eq!(net.sent.lock().len(), 50);
    }
}
