//! Random graph generators.
//!
//! Both generators produce plain edge lists over nodes `0..n`, ready to be
//! fed to the graph-topology dispatcher. The RNG is always passed in, so a
//! fixed seed reproduces the same topology.

use distsim_rng::{sample_distinct, RngCore};

/// Undirected edge list over nodes `0..n`.
pub type EdgeList = Vec<(u64, u64)>;

/// Index of the pair `(first, second)` with `second < first` in the
/// triangular enumeration of all unordered pairs.
fn pair_index(first: u64, second: u64) -> u64 {
    first * (first - 1) / 2 + second
}

/// Inverse of [`pair_index`].
fn pair_from_index(index: u64) -> (u64, u64) {
    // first = largest f with f*(f-1)/2 <= index.
    let mut first = (((1.0 + 8.0 * index as f64).sqrt() + 1.0) / 2.0) as u64;
    while pair_index(first, 0) > index {
        first -= 1;
    }
    while pair_index(first + 1, 0) <= index {
        first += 1;
    }
    (first, index - pair_index(first, 0))
}

/// Connected random graph in the spirit of the Erdős–Rényi model.
///
/// A random spanning structure guarantees connectivity: node `i` links to a
/// uniform earlier node. The remaining `m - (n - 1)` edges are sampled
/// without replacement from all unordered pairs not yet used. `m` is raised
/// to `n - 1` when it is too small to connect the graph.
pub fn connected_erdos<R: RngCore>(n: u64, m: u64, rng: &mut R) -> EdgeList {
    if n < 2 {
        return Vec::new();
    }
    let m = m.max(n - 1);
    let mut edges: EdgeList = Vec::with_capacity(m as usize);
    for i in 1..n {
        edges.push((i, rng.next_u64() % i));
    }
    let mut used: Vec<u64> = edges.iter().map(|&(a, b)| pair_index(a, b)).collect();
    used.sort_unstable();
    let extra = sample_distinct(rng, (m - (n - 1)) as usize, n * (n - 1) / 2, &used);
    for index in extra {
        edges.push(pair_from_index(index));
    }
    edges
}

/// Scale-free network via a Barabási–Albert variant.
///
/// Each new node samples `k` distinct existing edges and links to their
/// (deduplicated) endpoints; sampling edges rather than nodes yields the
/// preferential attachment. `k == 1` recovers the classic construction.
pub fn barabasi_albert<R: RngCore>(n: u64, k: u64, rng: &mut R) -> EdgeList {
    if n < 2 {
        return Vec::new();
    }
    let mut edges: EdgeList = vec![(1, 0)];
    for i in 2..n {
        let picks = sample_distinct(rng, k as usize, edges.len() as u64, &[]);
        let mut neighbours: Vec<u64> = picks
            .into_iter()
            .flat_map(|e| {
                let (a, b) = edges[e as usize];
                [a, b]
            })
            .collect();
        neighbours.sort_unstable();
        neighbours.dedup();
        for neighbour in neighbours {
            edges.push((i, neighbour));
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use distsim_rng::Xoroshiro128Plus;
    use std::collections::HashSet;

    /// Union-find connectivity check.
    fn is_connected(n: u64, edges: &EdgeList) -> bool {
        let mut parent: Vec<usize> = (0..n as usize).collect();
        fn find(parent: &mut Vec<usize>, x: usize) -> usize {
            if parent[x] != x {
                let root = find(parent, parent[x]);
                parent[x] = root;
            }
            parent[x]
        }
        for &(a, b) in edges {
            let (ra, rb) = (find(&mut parent, a as usize), find(&mut parent, b as usize));
            parent[ra] = rb;
        }
        let root = find(&mut parent, 0);
        (1..n as usize).all(|i| find(&mut parent, i) == root)
    }

    #[test]
    fn test_pair_index_roundtrip() {
        let mut seen = HashSet::new();
        for first in 1..40u64 {
            for second in 0..first {
                let idx = pair_index(first, second);
                assert!(seen.insert(idx), "index collision at ({first},{second})");
                assert_eq!(pair_from_index(idx), (first, second));
            }
        }
    }

    #[test]
    fn test_erdos_is_connected_with_exact_edge_count() {
        let mut rng = Xoroshiro128Plus::from_pair(1, 3);
        let edges = connected_erdos(30, 100, &mut rng);
        assert_eq!(edges.len(), 100);
        assert!(is_connected(30, &edges));
        // No duplicate undirected edges, no self-loops.
        let mut keys = HashSet::new();
        for &(a, b) in &edges {
            assert_ne!(a, b);
            let key = (a.max(b), a.min(b));
            assert!(keys.insert(key), "duplicate edge {key:?}");
        }
    }

    #[test]
    fn test_erdos_raises_edge_count_to_spanning_minimum() {
        let mut rng = Xoroshiro128Plus::from_pair(1, 4);
        let edges = connected_erdos(20, 0, &mut rng);
        assert_eq!(edges.len(), 19);
        assert!(is_connected(20, &edges));
    }

    #[test]
    fn test_erdos_is_deterministic_per_seed() {
        let mut a = Xoroshiro128Plus::from_pair(1, 5);
        let mut b = Xoroshiro128Plus::from_pair(1, 5);
        assert_eq!(connected_erdos(25, 60, &mut a), connected_erdos(25, 60, &mut b));
    }

    #[test]
    fn test_barabasi_touches_every_node() {
        let mut rng = Xoroshiro128Plus::from_pair(1, 6);
        let n = 50;
        let edges = barabasi_albert(n, 2, &mut rng);
        assert!(is_connected(n, &edges));
        let touched: HashSet<u64> = edges.iter().flat_map(|&(a, b)| [a, b]).collect();
        assert_eq!(touched.len() as u64, n);
    }

    #[test]
    fn test_barabasi_prefers_high_degree_nodes() {
        let mut rng = Xoroshiro128Plus::from_pair(1, 7);
        let n = 200;
        let edges = barabasi_albert(n, 1, &mut rng);
        let mut degree = vec![0u64; n as usize];
        for &(a, b) in &edges {
            degree[a as usize] += 1;
            degree[b as usize] += 1;
        }
        let max_degree = *degree.iter().max().unwrap();
        let avg = edges.len() as u64 * 2 / n;
        // Scale-free graphs grow hubs well above the average degree.
        assert!(
            max_degree >= avg * 3,
            "max degree {max_degree} vs average {avg}"
        );
    }
}
