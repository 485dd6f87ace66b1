//! Topology policies for the dispatcher.
//!
//! The dispatcher is generic over a [`Topology`] that answers the
//! `can_send` oracle and optionally tracks explicit adjacency. [`FullMesh`]
//! lets everyone talk to everyone; [`AdjacencyGraph`] restricts links to a
//! stored edge set and is the backing of the graph-topology dispatcher.

use crate::{EngineError, NodeId};
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Link admissibility and neighbour bookkeeping.
pub trait Topology: Send + Sync + 'static {
    /// May `a` send directly to `b`?
    fn can_send(&self, a: NodeId, b: NodeId) -> bool;

    /// The explicit adjacency of `n`, if this topology tracks one.
    ///
    /// `None` means "derive neighbours from the registry" (full mesh).
    fn adjacency(&self, n: NodeId) -> Option<Vec<NodeId>>;
}

/// Everyone reaches everyone (except themselves).
pub struct FullMesh;

impl Topology for FullMesh {
    fn can_send(&self, a: NodeId, b: NodeId) -> bool {
        a != b
    }

    fn adjacency(&self, _n: NodeId) -> Option<Vec<NodeId>> {
        None
    }
}

/// Explicit adjacency sets, indexed by sequentially assigned node ids.
///
/// Ordered sets keep neighbour iteration stable, which keeps single-threaded
/// runs reproducible from a seed.
pub struct AdjacencyGraph {
    directed: bool,
    adj: RwLock<Vec<BTreeSet<NodeId>>>,
}

impl AdjacencyGraph {
    pub fn new(directed: bool) -> Self {
        Self {
            directed,
            adj: RwLock::new(Vec::new()),
        }
    }

    /// Allocate the next sequential node slot and return its id.
    pub(crate) fn push_node(&self) -> NodeId {
        let mut adj = self.adj.write();
        adj.push(BTreeSet::new());
        (adj.len() - 1) as NodeId
    }

    pub(crate) fn node_slots(&self) -> usize {
        self.adj.read().len()
    }

    /// Insert an edge; undirected graphs get the reverse edge too.
    pub(crate) fn add_edge(&self, a: NodeId, b: NodeId) -> Result<(), EngineError> {
        let mut adj = self.adj.write();
        let len = adj.len() as NodeId;
        if a >= len {
            return Err(EngineError::InvalidEdge(a));
        }
        if b >= len {
            return Err(EngineError::InvalidEdge(b));
        }
        adj[a as usize].insert(b);
        if !self.directed {
            adj[b as usize].insert(a);
        }
        Ok(())
    }
}

impl Topology for AdjacencyGraph {
    fn can_send(&self, a: NodeId, b: NodeId) -> bool {
        self.adj
            .read()
            .get(a as usize)
            .map_or(false, |set| set.contains(&b))
    }

    fn adjacency(&self, n: NodeId) -> Option<Vec<NodeId>> {
        Some(
            self.adj
                .read()
                .get(n as usize)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mesh_forbids_self_send() {
        let mesh = FullMesh;
        assert!(!mesh.can_send(3, 3));
        assert!(mesh.can_send(3, 4));
        assert!(mesh.adjacency(3).is_none());
    }

    #[test]
    fn test_undirected_edges_go_both_ways() {
        let g = AdjacencyGraph::new(false);
        g.push_node();
        g.push_node();
        g.push_node();
        g.add_edge(0, 2).unwrap();
        assert!(g.can_send(0, 2));
        assert!(g.can_send(2, 0));
        assert!(!g.can_send(0, 1));
        assert_eq!(g.adjacency(0), Some(vec![2]));
    }

    #[test]
    fn test_directed_edges_are_one_way() {
        let g = AdjacencyGraph::new(true);
        g.push_node();
        g.push_node();
        g.add_edge(0, 1).unwrap();
        assert!(g.can_send(0, 1));
        assert!(!g.can_send(1, 0));
    }

    #[test]
    fn test_out_of_range_edge_is_rejected() {
        let g = AdjacencyGraph::new(false);
        g.push_node();
        assert!(matches!(
            g.add_edge(0, 5),
            Err(EngineError::InvalidEdge(5))
        ));
    }
}
