//! Per-node chain state: block storage, longest-chain head, balances.
//!
//! [`TinyState`] is shared (`Arc`) between a node's behavior object and any
//! party that must reach the chain without the dispatcher's handler lock:
//! the coalition coordinator publishing on a member's behalf, and the driver
//! reading results after shutdown. Three locks with a fixed nesting order:
//! chain before pending, pending before transactions; no path ever locks in
//! the reverse direction.

use crate::params::params;
use crate::types::{BlockId, TinyBlock, TinyTransaction, TxId, GENESIS_ID};
use distsim_engine::NodeId;
use parking_lot::Mutex;
use std::collections::BTreeSet;

/// One entry of the sparse block table.
#[derive(Debug, Clone, Default)]
pub enum Slot {
    /// Never seen.
    #[default]
    Vacant,
    /// Received, parked until its parent arrives.
    AwaitingParent(TinyBlock),
    /// Fully linked into the chain.
    Present(TinyBlock),
}

struct ChainStore {
    slots: Vec<Slot>,
    lengths: Vec<u64>,
    /// Orphans queued under the parent id they wait for.
    pending_children: Vec<Vec<TinyBlock>>,
    head: BlockId,
    balance: f64,
}

impl ChainStore {
    fn new(initial_balance: f64) -> Self {
        let mut store = Self {
            slots: Vec::new(),
            lengths: Vec::new(),
            pending_children: Vec::new(),
            head: GENESIS_ID,
            balance: initial_balance,
        };
        store.ensure(GENESIS_ID);
        store.slots[GENESIS_ID as usize] = Slot::Present(TinyBlock::genesis());
        store
    }

    fn ensure(&mut self, id: BlockId) {
        let needed = id as usize + 1;
        if self.slots.len() < needed {
            self.slots.resize_with(needed, Slot::default);
            self.lengths.resize(needed, 0);
            self.pending_children.resize_with(needed, Vec::new);
        }
    }

    fn slot(&self, id: BlockId) -> &Slot {
        static VACANT: Slot = Slot::Vacant;
        self.slots.get(id as usize).unwrap_or(&VACANT)
    }

    fn is_present(&self, id: BlockId) -> bool {
        matches!(self.slot(id), Slot::Present(_))
    }

    fn present(&self, id: BlockId) -> &TinyBlock {
        match self.slot(id) {
            Slot::Present(blk) => blk,
            _ => unreachable!("block {id} on a confirmed path must be present"),
        }
    }
}

/// Immutable view of a node's chain, taken after the simulation stops.
pub struct ChainSnapshot {
    /// Concrete blocks, indexed by block id.
    pub blocks: Vec<Option<TinyBlock>>,
    pub head: BlockId,
}

/// Pending-transaction bookkeeping carried only by miners.
struct MinerState {
    pending: Mutex<BTreeSet<TxId>>,
}

/// A node's TinyCoin state, shareable outside the handler lock.
pub struct TinyState {
    node: NodeId,
    chain: Mutex<ChainStore>,
    transactions: Mutex<Vec<Option<TinyTransaction>>>,
    miner: Option<MinerState>,
}

impl TinyState {
    pub fn new(node: NodeId, initial_balance: f64, miner: bool) -> Self {
        Self {
            node,
            chain: Mutex::new(ChainStore::new(initial_balance)),
            transactions: Mutex::new(Vec::new()),
            miner: miner.then(|| MinerState {
                pending: Mutex::new(BTreeSet::new()),
            }),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn head(&self) -> BlockId {
        self.chain.lock().head
    }

    /// Chain length from genesis of a linked block (0 for unknown ids).
    pub fn length_of(&self, id: BlockId) -> u64 {
        let chain = self.chain.lock();
        chain.lengths.get(id as usize).copied().unwrap_or(0)
    }

    pub fn balance(&self) -> f64 {
        self.chain.lock().balance
    }

    pub fn contains_block(&self, id: BlockId) -> bool {
        self.chain.lock().is_present(id)
    }

    /// Record a received transaction. Returns `false` for duplicates.
    /// Miners also add it to their pending set.
    pub fn handle_transaction(&self, tx: &TinyTransaction) -> bool {
        {
            let mut txs = self.transactions.lock();
            let idx = tx.id as usize;
            if txs.len() <= idx {
                txs.resize(idx + 1, None);
            }
            if txs[idx].is_some() {
                return false;
            }
            txs[idx] = Some(tx.clone());
        }
        if let Some(miner) = &self.miner {
            miner.pending.lock().insert(tx.id);
        }
        true
    }

    /// Record a received block. Returns `true` iff the block was never seen
    /// before (the caller forwards exactly the first sight).
    ///
    /// A block whose parent is unknown is parked; the parent's arrival
    /// promotes it (and its descendants, depth-first). The head only moves
    /// on a strict length increase, so ties keep the incumbent.
    pub fn handle_block(&self, blk: &TinyBlock) -> bool {
        let mut chain = self.chain.lock();
        let first_sight = matches!(chain.slot(blk.id), Slot::Vacant);
        if chain.is_present(blk.id) {
            return false;
        }

        let mut work = vec![blk.clone()];
        while let Some(block) = work.pop() {
            if chain.is_present(block.id) {
                continue;
            }
            chain.ensure(block.id.max(block.parent));
            if !chain.is_present(block.parent) {
                // Park under the missing parent; a revisited orphan is not
                // parked twice.
                if !matches!(chain.slot(block.id), Slot::AwaitingParent(_)) {
                    chain.pending_children[block.parent as usize].push(block.clone());
                }
                let id = block.id;
                chain.slots[id as usize] = Slot::AwaitingParent(block);
                continue;
            }
            let length = chain.lengths[block.parent as usize] + 1;
            let id = block.id;
            chain.lengths[id as usize] = length;
            chain.slots[id as usize] = Slot::Present(block);
            if length > chain.lengths[chain.head as usize] {
                self.update_head(&mut chain, id);
            }
            // Promote children depth-first, in arrival order.
            let children = std::mem::take(&mut chain.pending_children[id as usize]);
            for child in children.into_iter().rev() {
                work.push(child);
            }
        }
        first_sight
    }

    /// Move the head, confirming blocks entered on the new branch and
    /// unconfirming blocks left behind on the old one, up to their common
    /// ancestor.
    fn update_head(&self, chain: &mut ChainStore, new_head: BlockId) {
        let old_head = chain.head;
        chain.head = new_head;

        let mut confirmed: Vec<TinyBlock> = Vec::new();
        let mut unconfirmed: Vec<TinyBlock> = Vec::new();
        let mut n = new_head;
        let mut o = old_head;
        while chain.lengths[n as usize] > chain.lengths[o as usize] {
            confirmed.push(chain.present(n).clone());
            n = chain.present(n).parent;
        }
        while n != o {
            confirmed.push(chain.present(n).clone());
            unconfirmed.push(chain.present(o).clone());
            n = chain.present(n).parent;
            o = chain.present(o).parent;
        }

        for blk in &confirmed {
            chain.balance += self.block_value(blk);
        }
        for blk in &unconfirmed {
            chain.balance -= self.block_value(blk);
        }
        if let Some(miner) = &self.miner {
            let mut pending = miner.pending.lock();
            for blk in &confirmed {
                for tx in blk.transactions.iter() {
                    pending.remove(&tx.id);
                }
            }
            for blk in &unconfirmed {
                for tx in blk.transactions.iter() {
                    pending.insert(tx.id);
                }
            }
        }
    }

    /// What confirming `blk` is worth to this node: incoming transfers plus
    /// mining rewards when we mined it.
    fn block_value(&self, blk: &TinyBlock) -> f64 {
        let p = params();
        let mut value = 0.0;
        for tx in blk.transactions.iter() {
            if tx.destination == self.node {
                value += tx.amount;
            }
        }
        if blk.miner == Some(self.node) {
            value += p.block_reward + p.transaction_reward * blk.transactions.len() as f64;
        }
        value
    }

    /// Debit a transfer amount derived from the current balance.
    ///
    /// The raw draw is folded into `[0, balance)` and shaved slightly so the
    /// balance never goes negative; an empty account sends zero.
    pub fn withdraw_for_transfer(&self, draw: f64) -> f64 {
        let mut chain = self.chain.lock();
        let amount = if chain.balance > 0.0 {
            (draw % chain.balance) * 0.99
        } else {
            0.0
        };
        chain.balance -= amount;
        amount
    }

    /// Snapshot of the miner's pending set (empty for relays).
    pub fn pending_snapshot(&self) -> BTreeSet<TxId> {
        self.miner
            .as_ref()
            .map(|m| m.pending.lock().clone())
            .unwrap_or_default()
    }

    /// Up to `cap` pending transactions, in id order.
    pub fn collect_pending(&self, cap: usize) -> Vec<TinyTransaction> {
        let Some(miner) = &self.miner else {
            return Vec::new();
        };
        let pending = miner.pending.lock();
        let txs = self.transactions.lock();
        pending
            .iter()
            .filter_map(|&id| txs.get(id as usize).and_then(|slot| slot.clone()))
            .take(cap)
            .collect()
    }

    /// Look up known transactions by id, keeping at most `cap`.
    pub fn transactions_by_ids<'a>(
        &self,
        ids: impl Iterator<Item = &'a TxId>,
        cap: usize,
    ) -> Vec<TinyTransaction> {
        let txs = self.transactions.lock();
        ids.filter_map(|&id| txs.get(id as usize).and_then(|slot| slot.clone()))
            .take(cap)
            .collect()
    }

    /// Copy out the concrete blocks for post-run analysis.
    pub fn chain_snapshot(&self) -> ChainSnapshot {
        let chain = self.chain.lock();
        ChainSnapshot {
            blocks: chain
                .slots
                .iter()
                .map(|slot| match slot {
                    Slot::Present(blk) => Some(blk.clone()),
                    _ => None,
                })
                .collect(),
            head: chain.head,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(node: NodeId) -> TinyState {
        TinyState::new(node, 100.0, false)
    }

    fn miner(node: NodeId) -> TinyState {
        TinyState::new(node, 100.0, true)
    }

    fn block(parent: BlockId, miner: NodeId) -> TinyBlock {
        TinyBlock::new(parent, miner, vec![])
    }

    fn block_paying(parent: BlockId, miner: NodeId, dest: NodeId, amount: f64) -> TinyBlock {
        TinyBlock::new(parent, miner, vec![TinyTransaction::new(0, dest, amount)])
    }

    #[test]
    fn test_linear_chain_advances_head() {
        let state = relay(7);
        let b1 = block(GENESIS_ID, 1);
        let b2 = block(b1.id, 2);
        assert!(state.handle_block(&b1));
        assert_eq!(state.head(), b1.id);
        assert_eq!(state.length_of(b1.id), 1);
        assert!(state.handle_block(&b2));
        assert_eq!(state.head(), b2.id);
        assert_eq!(state.length_of(b2.id), 2);
    }

    #[test]
    fn test_duplicate_blocks_are_not_new() {
        let state = relay(7);
        let b1 = block(GENESIS_ID, 1);
        assert!(state.handle_block(&b1));
        assert!(!state.handle_block(&b1));
    }

    #[test]
    fn test_orphans_wait_for_their_parent() {
        let state = relay(7);
        let b1 = block(GENESIS_ID, 1);
        let b2 = block(b1.id, 2);
        let b3 = block(b2.id, 3);
        // Children arrive before their ancestors.
        assert!(state.handle_block(&b3));
        assert!(state.handle_block(&b2));
        assert_eq!(state.head(), GENESIS_ID);
        assert!(!state.contains_block(b3.id));
        // The missing link promotes the whole line.
        assert!(state.handle_block(&b1));
        assert_eq!(state.head(), b3.id);
        assert_eq!(state.length_of(b3.id), 3);
        assert!(state.contains_block(b2.id));
    }

    #[test]
    fn test_orphan_duplicates_are_not_reforwarded() {
        let state = relay(7);
        let b1 = block(GENESIS_ID, 1);
        let b2 = block(b1.id, 2);
        assert!(state.handle_block(&b2));
        // Same orphan again: already seen.
        assert!(!state.handle_block(&b2));
        assert!(state.handle_block(&b1));
        assert_eq!(state.head(), b2.id);
    }

    #[test]
    fn test_head_never_switches_on_tie() {
        let state = relay(7);
        let b1 = block(GENESIS_ID, 1);
        let c1 = block(GENESIS_ID, 2);
        state.handle_block(&b1);
        state.handle_block(&c1);
        // Both branches have length 1; the first stays head.
        assert_eq!(state.head(), b1.id);
        // Extending the rival makes it strictly longer.
        let c2 = block(c1.id, 2);
        state.handle_block(&c2);
        assert_eq!(state.head(), c2.id);
    }

    #[test]
    fn test_head_has_maximal_length() {
        let state = relay(7);
        let b1 = block(GENESIS_ID, 1);
        let b2 = block(b1.id, 1);
        let c1 = block(GENESIS_ID, 2);
        let c2 = block(c1.id, 2);
        let c3 = block(c2.id, 2);
        for b in [&b1, &b2, &c1, &c2, &c3] {
            state.handle_block(b);
        }
        let snapshot = state.chain_snapshot();
        let max_len = snapshot
            .blocks
            .iter()
            .flatten()
            .map(|b| state.length_of(b.id))
            .max()
            .unwrap();
        assert_eq!(state.length_of(snapshot.head), max_len);
    }

    #[test]
    fn test_confirm_credits_incoming_transfers() {
        let state = relay(7);
        let b1 = block_paying(GENESIS_ID, 1, 7, 10.0);
        state.handle_block(&b1);
        assert!((state.balance() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_rollback_reconciles_balance() {
        let state = relay(7);
        let b1 = block_paying(GENESIS_ID, 1, 7, 10.0);
        state.handle_block(&b1);
        assert!((state.balance() - 110.0).abs() < 1e-9);
        // A longer rival branch pays a different amount.
        let c1 = block_paying(GENESIS_ID, 2, 7, 5.0);
        let c2 = block(c1.id, 2);
        state.handle_block(&c1);
        assert!((state.balance() - 110.0).abs() < 1e-9, "no switch on tie");
        state.handle_block(&c2);
        // b1 unconfirmed (-10), c1 and c2 confirmed (+5).
        assert!((state.balance() - 105.0).abs() < 1e-9);
        assert_eq!(state.head(), c2.id);
    }

    #[test]
    fn test_miner_rewards_on_own_blocks() {
        let state = miner(9);
        let txs = vec![
            TinyTransaction::new(0, 1, 3.0),
            TinyTransaction::new(1, 0, 4.0),
        ];
        let b1 = TinyBlock::new(GENESIS_ID, 9, txs);
        state.handle_block(&b1);
        // block_reward 1.0 + 2 * transaction_reward 0.01, no incoming txs.
        assert!((state.balance() - 101.02).abs() < 1e-9);
    }

    #[test]
    fn test_pending_set_follows_confirmation() {
        let state = miner(9);
        let tx = TinyTransaction::new(1, 2, 5.0);
        assert!(state.handle_transaction(&tx));
        assert!(!state.handle_transaction(&tx), "duplicate transaction");
        assert!(state.pending_snapshot().contains(&tx.id));

        let b1 = TinyBlock::new(GENESIS_ID, 1, vec![tx.clone()]);
        state.handle_block(&b1);
        assert!(!state.pending_snapshot().contains(&tx.id), "confirmed");

        // A rival branch overtakes; the transaction returns to pending.
        let c1 = block(GENESIS_ID, 2);
        let c2 = block(c1.id, 2);
        state.handle_block(&c1);
        state.handle_block(&c2);
        assert!(state.pending_snapshot().contains(&tx.id), "unconfirmed");
    }

    #[test]
    fn test_collect_pending_respects_cap() {
        let state = miner(9);
        for i in 0..10 {
            state.handle_transaction(&TinyTransaction::new(i, i + 1, 1.0));
        }
        assert_eq!(state.collect_pending(4).len(), 4);
        assert_eq!(state.collect_pending(100).len(), 10);
    }

    #[test]
    fn test_withdraw_never_overdraws() {
        let state = relay(7);
        for draw in [0.5, 123.456, 1e12, 7.0] {
            let amount = state.withdraw_for_transfer(draw);
            assert!(amount >= 0.0);
        }
        assert!(state.balance() >= 0.0);
    }
}
