//! Miner placement over the generated topology.

use distsim_engine::NodeId;
use distsim_graph::EdgeList;
use distsim_rng::{sample_distinct, RngCore};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Where the selfish coalition sits in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfishPlacement {
    /// Uniformly random nodes.
    Random,
    /// The best-connected nodes, a stronger position for the attack.
    HighDegree,
}

impl FromStr for SelfishPlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "highdegree" => Ok(Self::HighDegree),
            other => Err(format!(
                "unknown placement {other:?}; valid values: random, highdegree"
            )),
        }
    }
}

/// Pick the honest and selfish miner node sets.
///
/// Selfish miners are placed first (randomly or on the highest-degree
/// nodes); honest miners are sampled uniformly from the remaining nodes.
pub fn choose_miners<R: RngCore>(
    rng: &mut R,
    n: u64,
    num_honest: u64,
    num_selfish: u64,
    edges: &EdgeList,
    placement: SelfishPlacement,
) -> (BTreeSet<NodeId>, BTreeSet<NodeId>) {
    let selfish: Vec<NodeId> = match placement {
        SelfishPlacement::Random => sample_distinct(rng, num_selfish as usize, n, &[]),
        SelfishPlacement::HighDegree => {
            let mut degree = vec![0u64; n as usize];
            for &(a, b) in edges {
                degree[a as usize] += 1;
                degree[b as usize] += 1;
            }
            let mut by_degree: Vec<(u64, NodeId)> = degree
                .iter()
                .enumerate()
                .map(|(id, &d)| (d, id as NodeId))
                .collect();
            by_degree.sort_unstable_by(|a, b| b.cmp(a));
            by_degree
                .into_iter()
                .take(num_selfish as usize)
                .map(|(_, id)| id)
                .collect()
        }
    };
    let honest = sample_distinct(rng, num_honest as usize, n, &selfish);
    (
        honest.into_iter().collect(),
        selfish.into_iter().collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use distsim_rng::Xoroshiro128Plus;

    #[test]
    fn test_random_placement_is_disjoint_and_sized() {
        let mut rng = Xoroshiro128Plus::from_pair(1, 31);
        let (honest, selfish) =
            choose_miners(&mut rng, 30, 6, 4, &Vec::new(), SelfishPlacement::Random);
        assert_eq!(honest.len(), 6);
        assert_eq!(selfish.len(), 4);
        assert!(honest.is_disjoint(&selfish));
        assert!(honest.iter().chain(&selfish).all(|&id| id < 30));
    }

    #[test]
    fn test_highdegree_placement_picks_the_hubs() {
        let mut rng = Xoroshiro128Plus::from_pair(1, 32);
        // A star around node 0 plus one spare edge: node 0 is the only hub.
        let edges: EdgeList = vec![(0, 1), (0, 2), (0, 3), (0, 4), (1, 2)];
        let (_, selfish) = choose_miners(&mut rng, 6, 2, 1, &edges, SelfishPlacement::HighDegree);
        assert!(selfish.contains(&0));
    }

    #[test]
    fn test_placement_parses_from_config_values() {
        assert_eq!(
            "random".parse::<SelfishPlacement>().unwrap(),
            SelfishPlacement::Random
        );
        assert_eq!(
            "highdegree".parse::<SelfishPlacement>().unwrap(),
            SelfishPlacement::HighDegree
        );
        assert!("ring".parse::<SelfishPlacement>().is_err());
    }
}
