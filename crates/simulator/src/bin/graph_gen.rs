//! Generate a random graph and print it as `a;b` lines.
//!
//! ```bash
//! graph-gen erdos 100 300
//! graph-gen barabasi 100 2 --seed 7
//! ```

use clap::Parser;
use distsim_graph::{barabasi_albert, connected_erdos};
use distsim_rng::Xoroshiro128Plus;
use distsim_simulator::NetworkKind;

#[derive(Parser, Debug)]
#[command(name = "graph-gen")]
#[command(version, about = "Random graph generator (CSV edge list)")]
struct Args {
    /// Graph model: erdos or barabasi.
    kind: NetworkKind,

    /// Number of nodes.
    nodes: u64,

    /// Edge count (erdos) or attachment factor (barabasi).
    connectivity: u64,

    /// RNG seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() {
    let args = Args::parse();
    let mut rng = Xoroshiro128Plus::from_pair(u64::MAX, args.seed);
    let edges = match args.kind {
        NetworkKind::Erdos => connected_erdos(args.nodes, args.connectivity, &mut rng),
        NetworkKind::Barabasi => barabasi_albert(args.nodes, args.connectivity, &mut rng),
    };
    for (a, b) in edges {
        println!("{a};{b}");
    }
}
