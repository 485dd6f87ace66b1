//! Relay and miner behaviors.

use crate::params::params;
use crate::policy::{MinerPolicy, PolicyContext};
use crate::state::TinyState;
use crate::types::{TinyData, TinyTransaction};
use distsim_engine::{EngineError, Message, Network, NodeBehavior, NodeId};
use distsim_rng::{RngCore, Xoroshiro128Plus};
use std::sync::Arc;
use tracing::debug;

/// Send a copy of `msg` to every neighbour of `from`.
pub(crate) fn broadcast(
    net: &dyn Network<TinyData>,
    from: NodeId,
    msg: &Message<TinyData>,
) -> Result<(), EngineError> {
    for neighbour in net.neighbours(from) {
        net.send_message(from, neighbour, msg.clone())?;
    }
    Ok(())
}

/// A plain relay: gossips first-sight transactions and blocks, tracks the
/// longest chain, and can originate transfers from its own balance.
pub struct TinyNode {
    state: Arc<TinyState>,
    rng: Xoroshiro128Plus,
}

impl TinyNode {
    pub fn new(id: NodeId, seed: u64) -> Self {
        Self::build(id, seed, false)
    }

    fn build(id: NodeId, seed: u64, miner: bool) -> Self {
        let mut rng = Xoroshiro128Plus::from_pair(id.wrapping_add(1), seed);
        // Nodes start with a small random endowment.
        let initial_balance = (rng.next_u64() % 1024 + 16) as f64;
        Self {
            state: Arc::new(TinyState::new(id, initial_balance, miner)),
            rng,
        }
    }

    pub fn id(&self) -> NodeId {
        self.state.node_id()
    }

    /// Shared handle to this node's chain state (used by the driver for
    /// post-run analysis and by the coalition coordinator).
    pub fn state(&self) -> Arc<TinyState> {
        Arc::clone(&self.state)
    }

    pub(crate) fn state_ref(&self) -> &Arc<TinyState> {
        &self.state
    }

    /// Build, record and gossip a transfer to a random other node.
    ///
    /// Returns the transaction when one was created (a one-node network
    /// cannot transfer).
    pub(crate) fn originate_transaction(
        &mut self,
        net: &dyn Network<TinyData>,
    ) -> Result<Option<TinyTransaction>, EngineError> {
        let me = self.id();
        if net.node_count() < 2 {
            return Ok(None);
        }
        let mut destination = net.random_node()?;
        while destination == me {
            destination = net.random_node()?;
        }
        let draw = self.rng.next_u64() as f64 / 1e6;
        let amount = self.state.withdraw_for_transfer(draw);
        let tx = TinyTransaction::new(me, destination, amount);
        self.state.handle_transaction(&tx);
        let mut msg = Message::new(TinyData::Transaction(tx.clone()));
        msg.set_delay(params().transaction_delay);
        broadcast(net, me, &msg)?;
        Ok(Some(tx))
    }

    /// Ingest one gossip message; returns whether it should be forwarded.
    fn ingest(&self, msg: &Message<TinyData>) -> bool {
        match msg.payload() {
            TinyData::Transaction(tx) => self.state.handle_transaction(tx),
            TinyData::Block(blk) => self.state.handle_block(blk),
            TinyData::NewTransaction | TinyData::MineBlock => {
                debug!(node = self.id(), "trigger payload arrived as traffic");
                false
            }
        }
    }
}

impl NodeBehavior<TinyData> for TinyNode {
    fn start_message(
        &mut self,
        net: &dyn Network<TinyData>,
        _msg: Message<TinyData>,
    ) -> Result<(), EngineError> {
        self.originate_transaction(net)?;
        Ok(())
    }

    fn handle_message(
        &mut self,
        net: &dyn Network<TinyData>,
        msg: Message<TinyData>,
    ) -> Result<(), EngineError> {
        if self.ingest(&msg) {
            broadcast(net, self.id(), &msg)?;
        }
        Ok(())
    }
}

/// A relay that also mines: carries hash power, a pending-transaction set
/// and a [`MinerPolicy`] deciding what to do when a mining slot fires.
pub struct TinyMiner {
    relay: TinyNode,
    power: u64,
    policy: Box<dyn MinerPolicy>,
}

impl TinyMiner {
    /// Build a miner, giving the policy factory access to the node's shared
    /// state before the behavior is boxed.
    pub fn with_policy<F>(id: NodeId, seed: u64, power: u64, make: F) -> Self
    where
        F: FnOnce(NodeId, &Arc<TinyState>) -> Box<dyn MinerPolicy>,
    {
        let relay = TinyNode::build(id, seed, true);
        let policy = make(id, relay.state_ref());
        Self {
            relay,
            power,
            policy,
        }
    }

    /// Miner following the default (honest) policy.
    pub fn honest(id: NodeId, seed: u64, power: u64) -> Self {
        Self::with_policy(id, seed, power, |_, _| {
            Box::new(crate::policy::HonestPolicy)
        })
    }

    pub fn id(&self) -> NodeId {
        self.relay.id()
    }

    /// Relative hash power; the driver weights mining triggers by it.
    pub fn power(&self) -> u64 {
        self.power
    }

    pub fn state(&self) -> Arc<TinyState> {
        self.relay.state()
    }
}

impl NodeBehavior<TinyData> for TinyMiner {
    /// Transaction triggers behave like a relay's; a block trigger runs the
    /// mining policy.
    fn start_message(
        &mut self,
        net: &dyn Network<TinyData>,
        msg: Message<TinyData>,
    ) -> Result<(), EngineError> {
        match msg.payload() {
            TinyData::MineBlock | TinyData::Block(_) => {
                let ctx = PolicyContext {
                    net,
                    id: self.relay.id(),
                    state: self.relay.state_ref(),
                };
                self.policy.on_mined(&ctx)
            }
            TinyData::NewTransaction | TinyData::Transaction(_) => {
                if let Some(tx) = self.relay.originate_transaction(net)? {
                    let ctx = PolicyContext {
                        net,
                        id: self.relay.id(),
                        state: self.relay.state_ref(),
                    };
                    self.policy.on_transaction(&ctx, &tx)?;
                }
                Ok(())
            }
        }
    }

    fn handle_message(
        &mut self,
        net: &dyn Network<TinyData>,
        msg: Message<TinyData>,
    ) -> Result<(), EngineError> {
        let id = self.relay.id();
        let forward = match msg.payload() {
            TinyData::Transaction(tx) => {
                let new = self.relay.state_ref().handle_transaction(tx);
                if new {
                    let ctx = PolicyContext {
                        net,
                        id,
                        state: self.relay.state_ref(),
                    };
                    self.policy.on_transaction(&ctx, tx)?;
                }
                new
            }
            TinyData::Block(blk) => {
                let new = self.relay.state_ref().handle_block(blk);
                if new {
                    let ctx = PolicyContext {
                        net,
                        id,
                        state: self.relay.state_ref(),
                    };
                    self.policy.on_block(&ctx, blk)?;
                }
                new
            }
            TinyData::NewTransaction | TinyData::MineBlock => {
                debug!(node = id, "trigger payload arrived as traffic");
                false
            }
        };
        if forward {
            broadcast(net, id, &msg)?;
        }
        Ok(())
    }
}
