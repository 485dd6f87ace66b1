//! Chord hop-count distribution.
//!
//! Builds a ring of `nodes` participants on `2^bits` positions, injects
//! `messages` random lookups and prints the normalized histogram of hop
//! counts (one value per bucket `1..=bits`).
//!
//! ```bash
//! chord-hops 10 512 10000
//! ```

use clap::Parser;
use distsim_chord::{ChordNode, CompletionCallback};
use distsim_engine::{HardwareManager, Message, Network, NodeId};
use distsim_rng::{RngCore, Xoroshiro128Plus};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chord-hops")]
#[command(version, about = "Chord routing hop-count distribution")]
struct Args {
    /// Ring size exponent: positions live in [0, 2^bits).
    bits: u32,

    /// Number of ring participants.
    nodes: u64,

    /// Number of lookups to inject.
    messages: u64,

    /// Worker threads for the dispatcher.
    #[arg(short = 't', long, default_value_t = 4)]
    threads: i32,

    /// RNG seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "chord run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), distsim_engine::EngineError> {
    // One bucket per possible hop count; greedy routing cannot take more
    // than `bits` hops, the extra slot absorbs the zero bucket.
    let counts: Arc<Vec<AtomicU64>> = Arc::new(
        (0..=args.bits as usize)
            .map(|_| AtomicU64::new(0))
            .collect(),
    );
    let received = Arc::new(AtomicU64::new(0));

    let cb_counts = Arc::clone(&counts);
    let cb_received = Arc::clone(&received);
    let callback: CompletionCallback = Arc::new(move |_id: NodeId, msg: &Message<u64>| {
        let bucket = (msg.hops() as usize).min(cb_counts.len() - 1);
        cb_counts[bucket].fetch_add(1, Ordering::Relaxed);
        cb_received.fetch_add(1, Ordering::Relaxed);
    });

    let hwm = HardwareManager::<u64>::new(1u64 << args.bits, args.threads, args.seed);
    let mut node_seeds = Xoroshiro128Plus::from_pair(u64::MAX, args.seed);
    for _ in 0..args.nodes {
        let id = hwm.gen_id()?;
        hwm.add_node(
            id,
            Box::new(ChordNode::new(
                id,
                args.bits,
                node_seeds.next_u64(),
                Arc::clone(&callback),
            )),
        )?;
    }
    hwm.run()?;
    for _ in 0..args.messages {
        hwm.gen_message(hwm.random_node()?)?;
    }
    while received.load(Ordering::Relaxed) != args.messages {
        thread::sleep(Duration::from_millis(10));
    }
    hwm.stop();

    let total = received.load(Ordering::Relaxed) as f64;
    let line: Vec<String> = (1..=args.bits as usize)
        .map(|i| format!("{:.3}", counts[i].load(Ordering::Relaxed) as f64 / total))
        .collect();
    println!("{}", line.join(" "));
    Ok(())
}
