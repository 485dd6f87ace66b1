//! Post-run chain analysis: forks and attribution.

use distsim_engine::NodeId;
use distsim_tinycoin::{ChainSnapshot, GENESIS_ID};
use std::collections::BTreeSet;

/// Summary of one node's final chain.
#[derive(Debug, Default, Clone)]
pub struct ChainReport {
    /// Branches that split off the surviving chain.
    pub total_splits: usize,
    /// Length in blocks of the longest abandoned branch.
    pub max_split_len: u64,
    /// Main-chain blocks mined by honest miners.
    pub honest_main_blocks: usize,
    /// Main-chain blocks mined by the selfish coalition.
    pub selfish_main_blocks: usize,
}

impl ChainReport {
    /// Coalition share of the surviving chain.
    pub fn selfish_fraction(&self) -> f64 {
        let total = self.honest_main_blocks + self.selfish_main_blocks;
        if total == 0 {
            0.0
        } else {
            self.selfish_main_blocks as f64 / total as f64
        }
    }
}

/// Walk a chain snapshot, marking the surviving chain and measuring the
/// branches that lost.
///
/// Block ids are assigned at creation, so parents always precede children
/// in id order and one forward pass suffices.
pub fn analyze_chain(snapshot: &ChainSnapshot, selfish: &BTreeSet<NodeId>) -> ChainReport {
    let size = snapshot.blocks.len();
    let mut main_chain = vec![false; size];
    let mut cursor = snapshot.head;
    while cursor != GENESIS_ID {
        main_chain[cursor as usize] = true;
        match &snapshot.blocks[cursor as usize] {
            Some(blk) => cursor = blk.parent,
            None => break,
        }
    }

    let mut report = ChainReport::default();
    let mut children_seen = vec![0u64; size];
    let mut split_len = vec![0u64; size];
    for blk in snapshot.blocks.iter().flatten() {
        if blk.id == GENESIS_ID {
            continue;
        }
        let id = blk.id as usize;
        let parent = blk.parent as usize;
        if main_chain[id] {
            match blk.miner {
                Some(miner) if selfish.contains(&miner) => report.selfish_main_blocks += 1,
                Some(_) => report.honest_main_blocks += 1,
                None => {}
            }
        }
        // A split starts where a losing block leaves a contested or
        // main-chain parent.
        if !main_chain[id] && (children_seen[parent] > 0 || main_chain[parent]) {
            split_len[id] = 1;
            report.total_splits += 1;
            report.max_split_len = report.max_split_len.max(1);
        }
        children_seen[parent] += 1;
        if split_len[parent] > 0 {
            split_len[id] = split_len[parent] + 1;
            report.max_split_len = report.max_split_len.max(split_len[id]);
        }
    }
    report
}
