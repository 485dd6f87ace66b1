//! Coalition withholding strategy (selfish mining).
//!
//! One [`SelfishCoordinator`] is shared by every selfish miner. It keeps a
//! private chain of withheld coalition blocks and an internal mirror of the
//! public chain; the race between the coalition's effective length and the
//! public head decides when to reveal.
//!
//! Locking discipline: decisions are *computed* under the single coalition
//! mutex and the resulting publications are *executed* after it is released.
//! Publication touches member chain state and node inboxes, both of which
//! are reachable from handler context; holding the coalition lock across
//! that fan-out would invert the member-lock → coalition-lock order used by
//! the policy hooks.

use crate::node::{broadcast, TinyMiner};
use crate::policy::{MinerPolicy, PolicyContext};
use crate::state::TinyState;
use crate::types::{BlockId, TinyBlock, TinyData, TinyTransaction, TxId, GENESIS_ID};
use distsim_engine::{EngineError, Message, Network, NodeId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Coalition bookkeeping, all under one mutex.
struct Coalition {
    /// Blocks mined by the coalition but not yet revealed, oldest first.
    private_chain: VecDeque<TinyBlock>,
    /// Blocks already revealed from the current private branch.
    published_blocks: usize,
    /// Public chain length at the point the private branch diverged.
    starting_height: u64,
    /// Tip of the private branch; coalition miners build on it.
    our_head: BlockId,
    /// Foreign blocks already reacted to.
    blocks_seen: BTreeSet<BlockId>,
    /// Transactions reserved for private blocks.
    private_pending: BTreeSet<TxId>,
    /// Enrolled members and their chain state, used for publication fan-out.
    members: BTreeMap<NodeId, Arc<TinyState>>,
}

/// Shared coalition agent implementing block withholding.
pub struct SelfishCoordinator {
    /// The coalition's own view of the public chain. Not registered in any
    /// dispatcher; it only ever sees blocks through coordinator calls.
    mirror: TinyState,
    inner: Mutex<Coalition>,
}

impl SelfishCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mirror: TinyState::new(NodeId::MAX, 0.0, true),
            inner: Mutex::new(Coalition {
                private_chain: VecDeque::new(),
                published_blocks: 0,
                starting_height: 0,
                our_head: GENESIS_ID,
                blocks_seen: BTreeSet::new(),
                private_pending: BTreeSet::new(),
                members: BTreeMap::new(),
            }),
        })
    }

    /// Register a coalition miner. Publication replays every revealed block
    /// into the member's chain state and broadcasts from its network seat.
    pub fn enroll(&self, id: NodeId, state: Arc<TinyState>) {
        self.inner.lock().members.insert(id, state);
    }

    pub fn is_member(&self, id: NodeId) -> bool {
        self.inner.lock().members.contains_key(&id)
    }

    /// The coalition's view of the public chain.
    pub fn mirror_state(&self) -> &TinyState {
        &self.mirror
    }

    pub fn private_chain_len(&self) -> usize {
        self.inner.lock().private_chain.len()
    }

    pub fn published_count(&self) -> usize {
        self.inner.lock().published_blocks
    }

    /// `starting_height + |private_chain| + published_blocks`.
    fn effective_length(inner: &Coalition) -> u64 {
        inner.starting_height + inner.private_chain.len() as u64 + inner.published_blocks as u64
    }

    /// Abandon the private branch and restart from the public head.
    fn adopt_public(&self, inner: &mut Coalition) {
        inner.private_chain.clear();
        inner.published_blocks = 0;
        inner.our_head = self.mirror.head();
        inner.starting_height = self.mirror.length_of(inner.our_head);
        inner.private_pending = self.mirror.pending_snapshot();
    }

    /// Reveal the oldest withheld block, if any.
    fn pop_front_one(&self, inner: &mut Coalition) -> Vec<TinyBlock> {
        match inner.private_chain.pop_front() {
            Some(blk) => {
                inner.published_blocks += 1;
                vec![blk]
            }
            None => Vec::new(),
        }
    }

    /// Reveal everything still private and restart from the public head.
    /// With no members enrolled there is nobody to publish through, so the
    /// branch is kept.
    fn take_private(&self, inner: &mut Coalition) -> Vec<TinyBlock> {
        if inner.members.is_empty() {
            return Vec::new();
        }
        let out: Vec<TinyBlock> = inner.private_chain.drain(..).collect();
        self.adopt_public(inner);
        out
    }

    /// Route a transaction seen by any member into the private pool.
    pub fn transaction(&self, tx: &TinyTransaction) {
        self.mirror.handle_transaction(tx);
        self.inner.lock().private_pending.insert(tx.id);
    }

    /// Assemble the next private block for `miner`: parent is the private
    /// tip, transactions come from the coalition pool.
    pub fn compose_block(&self, miner: NodeId) -> TinyBlock {
        let inner = self.inner.lock();
        let txs = self.mirror.transactions_by_ids(
            inner.private_pending.iter(),
            crate::params::params().transactions_per_block,
        );
        TinyBlock::new(inner.our_head, miner, txs)
    }

    /// A coalition miner mined `blk`.
    ///
    /// The block is withheld. If the coalition was tied with the public
    /// chain and this win breaks the tie with at least one older private
    /// block in play, the whole branch is revealed to lock in the race.
    pub fn our_block(
        &self,
        net: &dyn Network<TinyData>,
        blk: TinyBlock,
    ) -> Result<(), EngineError> {
        let to_send = {
            let mut inner = self.inner.lock();
            for tx in blk.transactions.iter() {
                inner.private_pending.remove(&tx.id);
            }
            inner.our_head = blk.id;
            inner.private_chain.push_back(blk);
            let l = Self::effective_length(&inner);
            let p = self.mirror.length_of(self.mirror.head());
            if l == p + 1 && inner.published_blocks + inner.private_chain.len() > 1 {
                self.take_private(&mut inner)
            } else {
                Vec::new()
            }
        };
        self.publish(net, to_send)
    }

    /// Someone outside the coalition published `blk`.
    ///
    /// Reacts only when the block becomes the public head:
    /// behind → abandon; tied → reveal one and race; one ahead → reveal the
    /// rest; further ahead → reveal one to keep the pressure on.
    pub fn others_block(
        &self,
        net: &dyn Network<TinyData>,
        blk: &TinyBlock,
    ) -> Result<(), EngineError> {
        self.mirror.handle_block(blk);
        let to_send = {
            let mut inner = self.inner.lock();
            if blk.miner.map_or(false, |m| inner.members.contains_key(&m)) {
                return Ok(());
            }
            if !inner.blocks_seen.insert(blk.id) {
                return Ok(());
            }
            if blk.id != self.mirror.head() {
                return Ok(());
            }
            let l = Self::effective_length(&inner);
            let p = self.mirror.length_of(blk.id);
            if l < p {
                debug!(coalition = l, public = p, "race lost, adopting public head");
                self.adopt_public(&mut inner);
                Vec::new()
            } else if l == p {
                self.pop_front_one(&mut inner)
            } else if l == p + 1 {
                self.take_private(&mut inner)
            } else {
                self.pop_front_one(&mut inner)
            }
        };
        self.publish(net, to_send)
    }

    /// Reveal everything still withheld; used at end of simulation.
    pub fn flush_chain(&self, net: &dyn Network<TinyData>) -> Result<(), EngineError> {
        let to_send = {
            let mut inner = self.inner.lock();
            self.take_private(&mut inner)
        };
        self.publish(net, to_send)
    }

    /// Execute a publication decision: ingest each block into the mirror and
    /// into every member's chain, then broadcast from every member's seat.
    ///
    /// Runs without the coalition lock. Members' policies are not re-entered
    /// here: published blocks are coalition-mined by construction, so the
    /// member-side reaction would stop at the membership guard anyway.
    fn publish(&self, net: &dyn Network<TinyData>, blocks: Vec<TinyBlock>) -> Result<(), EngineError> {
        if blocks.is_empty() {
            return Ok(());
        }
        let members: Vec<(NodeId, Arc<TinyState>)> = {
            let inner = self.inner.lock();
            inner
                .members
                .iter()
                .map(|(&id, state)| (id, Arc::clone(state)))
                .collect()
        };
        for blk in blocks {
            self.mirror.handle_block(&blk);
            for (id, state) in &members {
                state.handle_block(&blk);
                let delay = blk.propagation_delay();
                let mut msg = Message::new(TinyData::Block(blk.clone()));
                msg.set_delay(delay);
                broadcast(net, *id, &msg)?;
            }
        }
        Ok(())
    }
}

/// Per-miner policy that routes every event to the coalition.
pub struct SelfishPolicy {
    coordinator: Arc<SelfishCoordinator>,
}

impl SelfishPolicy {
    pub fn new(coordinator: Arc<SelfishCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl MinerPolicy for SelfishPolicy {
    fn on_mined(&mut self, ctx: &PolicyContext<'_>) -> Result<(), EngineError> {
        let blk = self.coordinator.compose_block(ctx.id);
        self.coordinator.our_block(ctx.net, blk)
    }

    fn on_block(&mut self, ctx: &PolicyContext<'_>, blk: &TinyBlock) -> Result<(), EngineError> {
        self.coordinator.others_block(ctx.net, blk)
    }

    fn on_transaction(
        &mut self,
        _ctx: &PolicyContext<'_>,
        tx: &TinyTransaction,
    ) -> Result<(), EngineError> {
        self.coordinator.transaction(tx);
        Ok(())
    }
}

/// Build a coalition miner enrolled with `coordinator`.
pub fn selfish_miner(
    id: NodeId,
    seed: u64,
    power: u64,
    coordinator: &Arc<SelfishCoordinator>,
) -> TinyMiner {
    TinyMiner::with_policy(id, seed, power, |id, state| {
        coordinator.enroll(id, Arc::clone(state));
        Box::new(SelfishPolicy::new(Arc::clone(coordinator)))
    })
}
