//! Per-node state owned by the dispatcher.
//!
//! A [`NodeCell`] bundles the two inboxes (immediate FIFO and delayed
//! min-heap) with the behavior object. Two locks with distinct roles:
//!
//! - the inbox lock is short and guards enqueue/dequeue only;
//! - the behavior lock is the handler lock: it wraps the whole message
//!   callback and serializes all hook execution for the node.
//!
//! A worker never calls into a behavior while holding the inbox lock, and
//! admission gating never touches the behavior lock, so two nodes sending to
//! each other concurrently cannot deadlock.

use crate::counters;
use crate::traits::{AdmissionGate, NodeBehavior, Payload};
use crate::{Message, NodeId};
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::time::Instant;

/// Result of one dequeue attempt against a node's inboxes.
pub(crate) enum Popped<T> {
    /// A message is ready; handle it.
    Message(Message<T>),
    /// Both inboxes are empty.
    Empty,
    /// Only delayed messages remain and the earliest is not yet due.
    NotDue,
}

struct Delayed<T> {
    due: Instant,
    seq: u64,
    msg: Message<T>,
}

impl<T> PartialEq for Delayed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Delayed<T> {}

impl<T> PartialOrd for Delayed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Delayed<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest due first; the sequence number keeps same-instant
        // deliveries in enqueue order.
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

struct Inbox<T> {
    immediate: VecDeque<Message<T>>,
    delayed: BinaryHeap<Reverse<Delayed<T>>>,
    seq: u64,
}

/// A registered node: identity, inboxes, admission gate and behavior.
pub struct NodeCell<T: Payload> {
    id: NodeId,
    inbox: Mutex<Inbox<T>>,
    gate: Box<dyn AdmissionGate<T>>,
    pub(crate) behavior: Mutex<Box<dyn NodeBehavior<T>>>,
}

impl<T: Payload> NodeCell<T> {
    pub(crate) fn new(
        id: NodeId,
        behavior: Box<dyn NodeBehavior<T>>,
        gate: Box<dyn AdmissionGate<T>>,
    ) -> Self {
        Self {
            id,
            inbox: Mutex::new(Inbox {
                immediate: VecDeque::new(),
                delayed: BinaryHeap::new(),
                seq: 0,
            }),
            gate,
            behavior: Mutex::new(behavior),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Add a message to the inbox; rejected messages are lost.
    pub(crate) fn enqueue(&self, msg: Message<T>) {
        let now = Instant::now();
        let mut inbox = self.inbox.lock();
        if !self.gate.admit(&msg) {
            return;
        }
        if msg.delay().is_zero() {
            inbox.immediate.push_back(msg);
        } else {
            counters::delayed_enqueued();
            let due = now + msg.delay();
            let seq = inbox.seq;
            inbox.seq += 1;
            inbox.delayed.push(Reverse(Delayed { due, seq, msg }));
        }
    }

    /// Take the next deliverable message, if any.
    ///
    /// Immediate messages are served in FIFO order before delayed ones;
    /// delayed messages become eligible in earliest-due order.
    pub(crate) fn pop_ready(&self, now: Instant) -> Popped<T> {
        let mut inbox = self.inbox.lock();
        if let Some(msg) = inbox.immediate.pop_front() {
            return Popped::Message(msg);
        }
        let result = match inbox.delayed.peek_mut() {
            Some(top) if top.0.due <= now => {
                let entry = std::collections::binary_heap::PeekMut::pop(top);
                counters::delayed_delivered();
                Popped::Message(entry.0.msg)
            }
            Some(_) => Popped::NotDue,
            None => Popped::Empty,
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{AcceptAll, Network};
    use crate::EngineError;
    use std::time::Duration;

    struct Inert;

    impl NodeBehavior<u64> for Inert {
        fn start_message(
            &mut self,
            _net: &dyn Network<u64>,
            _msg: Message<u64>,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        fn handle_message(
            &mut self,
            _net: &dyn Network<u64>,
            _msg: Message<u64>,
        ) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn cell() -> NodeCell<u64> {
        NodeCell::new(0, Box::new(Inert), Box::new(AcceptAll))
    }

    #[test]
    fn test_immediate_fifo_order() {
        let cell = cell();
        for i in 0..4u64 {
            cell.enqueue(Message::new(i));
        }
        let now = Instant::now();
        for i in 0..4u64 {
            match cell.pop_ready(now) {
                Popped::Message(m) => assert_eq!(*m.payload(), i),
                _ => panic!("expected a message"),
            }
        }
        assert!(matches!(cell.pop_ready(now), Popped::Empty));
    }

    #[test]
    fn test_delayed_not_due_then_due() {
        let cell = cell();
        let mut msg = Message::new(7u64);
        msg.set_delay(Duration::from_millis(50));
        cell.enqueue(msg);
        assert!(matches!(cell.pop_ready(Instant::now()), Popped::NotDue));
        let later = Instant::now() + Duration::from_millis(60);
        assert!(matches!(cell.pop_ready(later), Popped::Message(_)));
        assert!(matches!(cell.pop_ready(later), Popped::Empty));
    }

    #[test]
    fn test_immediate_served_before_due_delayed() {
        let cell = cell();
        let mut delayed = Message::new(1u64);
        delayed.set_delay(Duration::from_nanos(1));
        cell.enqueue(delayed);
        cell.enqueue(Message::new(2u64));
        let later = Instant::now() + Duration::from_millis(1);
        match cell.pop_ready(later) {
            Popped::Message(m) => assert_eq!(*m.payload(), 2),
            _ => panic!("expected the immediate message first"),
        }
        match cell.pop_ready(later) {
            Popped::Message(m) => assert_eq!(*m.payload(), 1),
            _ => panic!("expected the delayed message"),
        }
    }

    #[test]
    fn test_delayed_delivery_in_due_order() {
        let cell = cell();
        let mut slow = Message::new(1u64);
        slow.set_delay(Duration::from_millis(80));
        let mut fast = Message::new(2u64);
        fast.set_delay(Duration::from_millis(10));
        cell.enqueue(slow);
        cell.enqueue(fast);
        let later = Instant::now() + Duration::from_millis(200);
        match cell.pop_ready(later) {
            Popped::Message(m) => assert_eq!(*m.payload(), 2),
            _ => panic!("expected the earlier-due message"),
        }
    }

    #[test]
    fn test_rejecting_gate_loses_message() {
        struct RejectAll;
        impl AdmissionGate<u64> for RejectAll {
            fn admit(&self, _msg: &Message<u64>) -> bool {
                false
            }
        }
        let cell = NodeCell::new(0, Box::new(Inert), Box::new(RejectAll));
        cell.enqueue(Message::new(1u64));
        assert!(matches!(cell.pop_ready(Instant::now()), Popped::Empty));
    }
}
