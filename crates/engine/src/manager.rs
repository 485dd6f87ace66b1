//! The dispatcher: node registry, ready queue and worker pool.
//!
//! [`HardwareManager`] owns the whole node population and drives their
//! handlers from a fixed pool of worker threads. Delivery works through a
//! single MPMC ready queue of node ids: `send_message` enqueues into the
//! destination inbox and pushes the destination id; a worker pops the id,
//! takes that node's handler lock and drains a bounded batch of messages.
//!
//! Spurious wakeups are tolerated: a node id may sit on the ready queue
//! several times, and the inbox drain simply finds nothing to do.
//!
//! Structural mutation (adding or failing nodes) happens under a coordinated
//! pause: workers park with no locks held, the registry is swapped, workers
//! resume. Steady-state workers only ever take the registry read lock for the
//! duration of one `Arc` clone.

use crate::node::{NodeCell, Popped};
use crate::topology::{AdjacencyGraph, FullMesh, Topology};
use crate::traits::{AcceptAll, AdmissionGate, Network, NodeBehavior, Payload};
use crate::{EngineError, Message, NodeId};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use distsim_rng::{RngCore, Xoroshiro128Plus};
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Messages drained per handler-lock acquisition before the node is pushed
/// back and the worker moves on. Bounded batching keeps one hot node from
/// starving the rest of the population.
const HANDLER_BATCH_LIMIT: usize = 128;

/// Tick used while waiting for workers to park during a pause.
const PAUSE_TICK: Duration = Duration::from_micros(10);

/// Bounded wait on the ready queue; every enqueue wakes a worker, the
/// timeout only bounds how long shutdown and pause flags go unobserved.
const DEQUEUE_WAIT: Duration = Duration::from_micros(50);

thread_local! {
    static THREAD_RNG: RefCell<Xoroshiro128Plus> = RefCell::new(Xoroshiro128Plus::default());
}

fn rng_u64() -> u64 {
    THREAD_RNG.with(|rng| rng.borrow_mut().next_u64())
}

fn reseed_thread_rng(s0: u64, s1: u64) {
    THREAD_RNG.with(|rng| *rng.borrow_mut() = Xoroshiro128Plus::from_pair(s0, s1));
}

/// The simulation dispatcher, generic over its [`Topology`].
///
/// Constructed behind an `Arc` so worker threads can hold on to it; node
/// handlers only ever see it as `&dyn Network<T>`.
pub struct HardwareManager<T: Payload, Topo: Topology = FullMesh> {
    max_id: NodeId,
    nthreads: usize,
    seed: u64,
    fail_threshold: u64,
    topology: Topo,
    nodes: RwLock<BTreeMap<NodeId, Arc<NodeCell<T>>>>,
    ready_tx: Sender<NodeId>,
    ready_rx: Receiver<NodeId>,
    stopping: AtomicBool,
    pausing: AtomicBool,
    running_threads: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Dispatcher specialization with an explicit adjacency structure.
///
/// Ids are assigned sequentially by [`add_node_seq`](HardwareManager::add_node_seq);
/// random id generation is not available on this type.
pub type GraphHardwareManager<T> = HardwareManager<T, AdjacencyGraph>;

fn effective_threads(requested: i32) -> usize {
    if requested < 0 {
        thread::available_parallelism().map_or(1, |n| n.get())
    } else {
        (requested as usize).max(1)
    }
}

impl<T: Payload> HardwareManager<T, FullMesh> {
    /// Full-mesh dispatcher with ids drawn from `[0, max_id)`.
    ///
    /// `nthreads == -1` uses the hardware concurrency; the pool always has at
    /// least one worker.
    pub fn new(max_id: NodeId, nthreads: i32, seed: u64) -> Arc<Self> {
        Self::with_link_fail(max_id, nthreads, seed, 0.0)
    }

    /// Like [`new`](Self::new), with a per-send probability of silently
    /// dropping the message.
    pub fn with_link_fail(
        max_id: NodeId,
        nthreads: i32,
        seed: u64,
        link_fail_chance: f64,
    ) -> Arc<Self> {
        Self::build(FullMesh, max_id, nthreads, seed, link_fail_chance)
    }

    /// Draw an unused random id.
    ///
    /// Fails once the registry is more than 75% full, at which point random
    /// probing degenerates.
    pub fn gen_id(&self) -> Result<NodeId, EngineError> {
        let nodes = self.nodes.read();
        if 4 * nodes.len() as u64 / 3 >= self.max_id {
            return Err(EngineError::IdSpaceSaturated {
                registered: nodes.len(),
                max_id: self.max_id,
            });
        }
        loop {
            let id = rng_u64() % self.max_id;
            if !nodes.contains_key(&id) {
                return Ok(id);
            }
        }
    }
}

impl<T: Payload> HardwareManager<T, AdjacencyGraph> {
    /// Graph-topology dispatcher; nodes receive sequential ids.
    pub fn new(nthreads: i32, seed: u64) -> Arc<Self> {
        Self::build(AdjacencyGraph::new(false), 0, nthreads, seed, 0.0)
    }

    /// Directed variant: edges added with [`add_edge`](Self::add_edge) only
    /// go one way.
    pub fn new_directed(nthreads: i32, seed: u64) -> Arc<Self> {
        Self::build(AdjacencyGraph::new(true), 0, nthreads, seed, 0.0)
    }

    /// Register a node under the next sequential id (0, 1, 2, ...).
    pub fn add_node_seq(
        &self,
        behavior: Box<dyn NodeBehavior<T>>,
    ) -> Result<NodeId, EngineError> {
        let id = self.topology.push_node();
        self.add_node(id, behavior)?;
        Ok(id)
    }

    /// Insert an edge between two registered nodes.
    pub fn add_edge(&self, a: NodeId, b: NodeId) -> Result<(), EngineError> {
        self.topology.add_edge(a, b)
    }

    /// Number of allocated node slots (equals the next sequential id).
    pub fn graph_size(&self) -> usize {
        self.topology.node_slots()
    }
}

impl<T: Payload, Topo: Topology> HardwareManager<T, Topo> {
    fn build(
        topology: Topo,
        max_id: NodeId,
        nthreads: i32,
        seed: u64,
        link_fail_chance: f64,
    ) -> Arc<Self> {
        let (ready_tx, ready_rx) = unbounded();
        Arc::new(Self {
            max_id,
            nthreads: effective_threads(nthreads),
            seed,
            fail_threshold: (link_fail_chance.clamp(0.0, 1.0) * u64::MAX as f64) as u64,
            topology,
            nodes: RwLock::new(BTreeMap::new()),
            ready_tx,
            ready_rx,
            stopping: AtomicBool::new(false),
            pausing: AtomicBool::new(false),
            running_threads: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Number of worker threads the pool will run with.
    pub fn nthreads(&self) -> usize {
        self.nthreads
    }

    /// Run `f` with the worker pool quiesced.
    fn with_paused<R>(&self, f: impl FnOnce() -> R) -> R {
        self.pause();
        let result = f();
        self.resume();
        result
    }

    /// Register a node under the given id and run its `init` hook.
    pub fn add_node(
        &self,
        id: NodeId,
        behavior: Box<dyn NodeBehavior<T>>,
    ) -> Result<(), EngineError> {
        self.add_node_with_gate(id, behavior, Box::new(AcceptAll))
    }

    /// Register a node with a custom inbox admission gate.
    pub fn add_node_with_gate(
        &self,
        id: NodeId,
        behavior: Box<dyn NodeBehavior<T>>,
        gate: Box<dyn AdmissionGate<T>>,
    ) -> Result<(), EngineError> {
        let cell = Arc::new(NodeCell::new(id, behavior, gate));
        self.with_paused(|| {
            let mut nodes = self.nodes.write();
            if nodes.contains_key(&id) {
                return Err(EngineError::DuplicateNode(id));
            }
            nodes.insert(id, Arc::clone(&cell));
            Ok(())
        })?;
        let mut behavior = cell.behavior.lock();
        if let Err(error) = behavior.init(self) {
            warn!(node = id, %error, "node init failed");
        }
        Ok(())
    }

    /// Remove a node, atomically with respect to the workers.
    ///
    /// Ready-queue entries for the removed id become harmless spurious
    /// wakeups.
    pub fn fail(&self, id: NodeId) -> Result<(), EngineError> {
        self.with_paused(|| {
            let mut nodes = self.nodes.write();
            nodes
                .remove(&id)
                .map(|_| ())
                .ok_or(EngineError::UnknownNode(id))
        })
    }

    /// Originate a default-payload message at `id` (see
    /// [`gen_message_with`](Self::gen_message_with)).
    pub fn gen_message(&self, id: NodeId) -> Result<(), EngineError> {
        self.gen_message_with(id, T::default())
    }

    /// Synthesize a fresh message and invoke the node's `start_message` hook
    /// under its handler lock. The hop count is not incremented.
    ///
    /// An unknown sender is an error; a failure inside the hook itself is
    /// logged and swallowed, like handler failures in the worker loop.
    pub fn gen_message_with(&self, id: NodeId, payload: T) -> Result<(), EngineError> {
        let cell = self
            .nodes
            .read()
            .get(&id)
            .cloned()
            .ok_or(EngineError::UnknownNode(id))?;
        let mut behavior = cell.behavior.lock();
        if let Err(error) = behavior.start_message(self, Message::new(payload)) {
            warn!(node = id, %error, "start_message failed");
        }
        Ok(())
    }

    /// Spawn the worker pool.
    pub fn run(self: &Arc<Self>) -> Result<(), EngineError> {
        self.stopping.store(false, Ordering::SeqCst);
        self.pausing.store(false, Ordering::SeqCst);
        let mut workers = self.workers.lock();
        for index in 0..self.nthreads {
            let manager = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(format!("distsim-worker-{index}"))
                .spawn(move || manager.worker_loop(index))?;
            workers.push(handle);
        }
        Ok(())
    }

    /// Quiesce the worker pool: set the pause flag and wait until every
    /// worker has parked outside any handler.
    pub fn pause(&self) {
        self.pausing.store(true, Ordering::SeqCst);
        while self.running_threads.load(Ordering::SeqCst) != 0 {
            thread::sleep(PAUSE_TICK);
        }
    }

    /// Release paused workers.
    pub fn resume(&self) {
        self.pausing.store(false, Ordering::SeqCst);
    }

    /// Stop the pool and join every worker. In-flight handler invocations
    /// run to completion; undelivered inbox contents are left in place.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("worker thread panicked before join");
            }
        }
    }

    fn worker_loop(&self, index: usize) {
        reseed_thread_rng(index as u64 + 1, self.seed);
        self.running_threads.fetch_add(1, Ordering::SeqCst);
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            if self.pausing.load(Ordering::SeqCst) {
                // Park with no locks held until the structural mutation ends.
                self.running_threads.fetch_sub(1, Ordering::SeqCst);
                while self.pausing.load(Ordering::SeqCst)
                    && !self.stopping.load(Ordering::SeqCst)
                {
                    thread::sleep(PAUSE_TICK);
                }
                self.running_threads.fetch_add(1, Ordering::SeqCst);
                continue;
            }
            let id = match self.ready_rx.recv_timeout(DEQUEUE_WAIT) {
                Ok(id) => id,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let Some(cell) = self.nodes.read().get(&id).cloned() else {
                // The node failed while its id was still queued.
                debug!(node = id, "dropping wakeup for removed node");
                continue;
            };
            self.drain_node(&cell);
        }
        self.running_threads.fetch_sub(1, Ordering::SeqCst);
    }

    /// Handle up to [`HANDLER_BATCH_LIMIT`] messages under one handler-lock
    /// acquisition.
    fn drain_node(&self, cell: &NodeCell<T>) {
        let mut behavior = cell.behavior.lock();
        for _ in 0..HANDLER_BATCH_LIMIT {
            match cell.pop_ready(Instant::now()) {
                Popped::Empty => return,
                Popped::NotDue => {
                    // Defer the due-time check instead of spinning here.
                    let _ = self.ready_tx.send(cell.id());
                    return;
                }
                Popped::Message(msg) => {
                    if let Err(error) = behavior.handle_message(self, msg) {
                        warn!(node = cell.id(), %error, "message handler failed");
                    }
                }
            }
        }
        // Batch limit hit with work left over; give other nodes a turn.
        let _ = self.ready_tx.send(cell.id());
    }

    fn send_message_impl(
        &self,
        src: NodeId,
        dst: NodeId,
        mut msg: Message<T>,
    ) -> Result<(), EngineError> {
        if self.fail_threshold > 0 && rng_u64() < self.fail_threshold {
            return Ok(());
        }
        let cell = {
            let nodes = self.nodes.read();
            if !nodes.contains_key(&src) {
                return Err(EngineError::UnknownNode(src));
            }
            let cell = nodes.get(&dst).cloned().ok_or(EngineError::UnknownNode(dst))?;
            if !self.topology.can_send(src, dst) {
                return Err(EngineError::NoLink { src, dst });
            }
            cell
        };
        msg.record_hop();
        cell.enqueue(msg);
        let _ = self.ready_tx.send(dst);
        Ok(())
    }

    fn neighbours_impl(&self, n: NodeId) -> Vec<NodeId> {
        match self.topology.adjacency(n) {
            Some(adj) => adj,
            None => self
                .nodes
                .read()
                .keys()
                .copied()
                .filter(|&id| self.topology.can_send(n, id))
                .collect(),
        }
    }

    fn random_node_impl(&self) -> Result<NodeId, EngineError> {
        let nodes = self.nodes.read();
        if nodes.is_empty() {
            return Err(EngineError::EmptyRegistry);
        }
        let upper = if self.max_id > 0 {
            self.max_id
        } else {
            nodes.len() as NodeId
        };
        // Probe and round up to the next registered id; retry past the tail.
        loop {
            let probe = rng_u64() % upper;
            if let Some((&id, _)) = nodes.range(probe..).next() {
                return Ok(id);
            }
        }
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Is any node registered with id `>= i`?
    pub fn has_bigger_id(&self, i: NodeId) -> bool {
        self.nodes.read().range(i..).next().is_some()
    }

    /// Smallest registered id `>= i`.
    pub fn next_id(&self, i: NodeId) -> Result<NodeId, EngineError> {
        self.nodes
            .read()
            .range(i..)
            .next()
            .map(|(&id, _)| id)
            .ok_or(EngineError::NoSuccessorId(i))
    }
}

impl<T: Payload, Topo: Topology> Network<T> for HardwareManager<T, Topo> {
    fn send_message(&self, src: NodeId, dst: NodeId, msg: Message<T>) -> Result<(), EngineError> {
        self.send_message_impl(src, dst, msg)
    }

    fn can_send(&self, a: NodeId, b: NodeId) -> bool {
        self.topology.can_send(a, b)
    }

    fn neighbours(&self, n: NodeId) -> Vec<NodeId> {
        self.neighbours_impl(n)
    }

    fn iter_neighbours(&self, n: NodeId, cb: &mut dyn FnMut(NodeId) -> bool) {
        for neighbour in self.neighbours_impl(n) {
            if !cb(neighbour) {
                break;
            }
        }
    }

    fn count_neighbours(&self, n: NodeId) -> usize {
        self.neighbours_impl(n).len()
    }

    fn has_bigger_id(&self, i: NodeId) -> bool {
        HardwareManager::has_bigger_id(self, i)
    }

    fn next_id(&self, i: NodeId) -> Result<NodeId, EngineError> {
        HardwareManager::next_id(self, i)
    }

    fn random_node(&self) -> Result<NodeId, EngineError> {
        self.random_node_impl()
    }

    fn node_count(&self) -> usize {
        HardwareManager::node_count(self)
    }
}
