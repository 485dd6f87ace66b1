//! Mining policies.
//!
//! A [`TinyMiner`](crate::TinyMiner) delegates the *strategy* of mining to a
//! policy object: what to include in a block, which parent to build on, and
//! when to reveal it. Policies receive borrowed views of the miner's state
//! plus the network handle; they never see the dispatcher's internals.

use crate::params::params;
use crate::state::TinyState;
use crate::types::{TinyBlock, TinyData, TinyTransaction};
use distsim_engine::{EngineError, Message, Network, NodeId};
use std::sync::Arc;

/// What a policy hook gets to work with.
pub struct PolicyContext<'a> {
    pub net: &'a dyn Network<TinyData>,
    pub id: NodeId,
    pub state: &'a Arc<TinyState>,
}

/// Strategy hooks driven by the owning miner.
///
/// `on_block` and `on_transaction` fire only on first sight, after the
/// miner's own state has been updated.
pub trait MinerPolicy: Send {
    /// A mining slot was won; assemble and (possibly) reveal a block.
    fn on_mined(&mut self, ctx: &PolicyContext<'_>) -> Result<(), EngineError>;

    /// A new block reached this miner.
    fn on_block(&mut self, _ctx: &PolicyContext<'_>, _blk: &TinyBlock) -> Result<(), EngineError> {
        Ok(())
    }

    /// A new transaction reached this miner.
    fn on_transaction(
        &mut self,
        _ctx: &PolicyContext<'_>,
        _tx: &TinyTransaction,
    ) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Mine on the public head and reveal immediately.
pub struct HonestPolicy;

impl MinerPolicy for HonestPolicy {
    fn on_mined(&mut self, ctx: &PolicyContext<'_>) -> Result<(), EngineError> {
        let parent = ctx.state.head();
        let txs = ctx.state.collect_pending(params().transactions_per_block);
        let blk = TinyBlock::new(parent, ctx.id, txs);
        publish_block(ctx.state, ctx.net, blk)
    }
}

/// Record a freshly mined block locally and gossip it to the neighbours.
pub(crate) fn publish_block(
    state: &TinyState,
    net: &dyn Network<TinyData>,
    blk: TinyBlock,
) -> Result<(), EngineError> {
    state.handle_block(&blk);
    let delay = blk.propagation_delay();
    let mut msg = Message::new(TinyData::Block(blk));
    msg.set_delay(delay);
    crate::node::broadcast(net, state.node_id(), &msg)
}
