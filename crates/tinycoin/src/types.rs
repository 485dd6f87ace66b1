//! Transactions, blocks and the gossip payload.

use crate::params::params;
use distsim_engine::NodeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type TxId = u64;
pub type BlockId = u64;

/// Block id of the shared genesis block.
pub const GENESIS_ID: BlockId = 0;

// Id generators are process-wide so every node indexes the same id space.
// Ids are dense but not necessarily contiguous at any single node.
static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// A value transfer between two nodes.
#[derive(Debug, Clone)]
pub struct TinyTransaction {
    pub id: TxId,
    pub source: NodeId,
    pub destination: NodeId,
    pub amount: f64,
}

impl TinyTransaction {
    pub fn new(source: NodeId, destination: NodeId, amount: f64) -> Self {
        Self {
            id: NEXT_TX_ID.fetch_add(1, Ordering::Relaxed),
            source,
            destination,
            amount,
        }
    }
}

/// A mined block. The transaction list is shared, not copied, as blocks
/// gossip through the network.
#[derive(Debug, Clone)]
pub struct TinyBlock {
    pub id: BlockId,
    pub parent: BlockId,
    /// `None` only for the genesis block.
    pub miner: Option<NodeId>,
    pub transactions: Arc<Vec<TinyTransaction>>,
}

impl TinyBlock {
    pub fn new(parent: BlockId, miner: NodeId, transactions: Vec<TinyTransaction>) -> Self {
        Self {
            id: NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed),
            parent,
            miner: Some(miner),
            transactions: Arc::new(transactions),
        }
    }

    /// The block every chain starts from.
    pub fn genesis() -> Self {
        Self {
            id: GENESIS_ID,
            parent: GENESIS_ID,
            miner: None,
            transactions: Arc::new(Vec::new()),
        }
    }

    /// Propagation latency: a flat base plus a per-transaction cost.
    pub fn propagation_delay(&self) -> Duration {
        let p = params();
        p.base_delay + p.delay_per_transaction * self.transactions.len() as u32
    }
}

/// Gossip payload.
///
/// The two trigger variants are driver-injected: `NewTransaction` asks a
/// node to originate a transfer, `MineBlock` asks a miner to run its mining
/// policy. Neither travels between nodes.
#[derive(Debug, Clone, Default)]
pub enum TinyData {
    #[default]
    NewTransaction,
    MineBlock,
    Transaction(TinyTransaction),
    Block(TinyBlock),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let a = TinyTransaction::new(0, 1, 1.0);
        let b = TinyTransaction::new(1, 0, 2.0);
        assert!(b.id > a.id);
        let x = TinyBlock::new(GENESIS_ID, 0, vec![]);
        let y = TinyBlock::new(x.id, 1, vec![]);
        assert!(y.id > x.id);
        assert!(x.id > GENESIS_ID);
    }

    #[test]
    fn test_block_delay_scales_with_transactions() {
        let p = params();
        let empty = TinyBlock::new(GENESIS_ID, 0, vec![]);
        assert_eq!(empty.propagation_delay(), p.base_delay);
        let txs = vec![
            TinyTransaction::new(0, 1, 1.0),
            TinyTransaction::new(1, 2, 1.0),
            TinyTransaction::new(2, 0, 1.0),
        ];
        let full = TinyBlock::new(GENESIS_ID, 0, txs);
        assert_eq!(
            full.propagation_delay(),
            p.base_delay + p.delay_per_transaction * 3
        );
    }

    #[test]
    fn test_genesis_shape() {
        let g = TinyBlock::genesis();
        assert_eq!(g.id, GENESIS_ID);
        assert_eq!(g.parent, GENESIS_ID);
        assert!(g.miner.is_none());
        assert!(g.transactions.is_empty());
    }
}
