//! TinyCoin scenario driver.
//!
//! Builds the network from a [`SimSettings`], injects transaction and mining
//! triggers until the block budget is spent, flushes the coalition, drains
//! the delayed backlog and analyzes the resulting chain.

use crate::analysis::{analyze_chain, ChainReport};
use crate::config::{Config, ConfigError};
use crate::hashpower::{assign_hash_power, HashPowerError};
use crate::miners::{choose_miners, SelfishPlacement};
use distsim_engine::{
    queued_messages, EngineError, GraphHardwareManager, Network, NodeId,
};
use distsim_graph::{barabasi_albert, connected_erdos};
use distsim_rng::{choose_weighted, RngCore, Xoroshiro128Plus};
use distsim_tinycoin::{
    install_params, selfish_miner, SelfishCoordinator, TinyData, TinyMiner, TinyNode, TinyParams,
    TinyState,
};
use std::collections::BTreeSet;
use std::io::Write as _;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    HashPower(#[from] HashPowerError),

    #[error("the scenario has no miners; nothing can produce blocks")]
    NoMiners,
}

/// Graph model for the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Erdos,
    Barabasi,
}

impl FromStr for NetworkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "erdos" => Ok(Self::Erdos),
            "barabasi" => Ok(Self::Barabasi),
            other => Err(format!(
                "unknown graph type {other:?}; valid types: erdos, barabasi"
            )),
        }
    }
}

/// Everything a TinyCoin run needs, resolvable from a config file.
#[derive(Debug, Clone)]
pub struct SimSettings {
    pub params: TinyParams,
    pub network_kind: NetworkKind,
    pub network_size: u64,
    pub network_connectivity: u64,
    pub seed: u64,
    pub nthreads: i32,
    pub miners_percent: f64,
    pub selfish_percent: f64,
    pub selfish_power_percent: f64,
    pub selfish_placement: SelfishPlacement,
    pub transaction_interval: Duration,
    pub block_interval: Duration,
    pub final_wait: Duration,
    pub block_num: u64,
    /// Render the carriage-return status line while running.
    pub progress: bool,
}

impl SimSettings {
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let selfish_percent = cfg.get("selfish_percent", 0.0)?;
        Ok(Self {
            params: TinyParams {
                delay_per_transaction: Duration::from_nanos(cfg.get("delay_per_transaction", 20)?),
                base_delay: Duration::from_nanos(cfg.get("base_delay", 100)?),
                transaction_delay: Duration::from_nanos(cfg.get("delay_per_transaction", 20)?),
                block_reward: cfg.get("block_reward", 1.0)?,
                transaction_reward: cfg.get("transaction_reward", 0.01)?,
                transactions_per_block: cfg.get("transactions_per_block", 50)?,
            },
            network_kind: cfg.get("network_kind", NetworkKind::Erdos)?,
            network_size: cfg.get("network_size", 20)?,
            network_connectivity: cfg.get("network_connectivity", 100)?,
            seed: cfg.get("seed", 0)?,
            nthreads: cfg.get("nthreads", -1)?,
            miners_percent: cfg.get("miners_percent", 0.2)?,
            selfish_percent,
            selfish_power_percent: cfg.get("selfish_power_percent", selfish_percent)?,
            selfish_placement: cfg.get("selfish_algo", SelfishPlacement::Random)?,
            transaction_interval: Duration::from_micros(cfg.get("transaction_interval", 1000)?),
            block_interval: Duration::from_micros(cfg.get("block_interval", 10_000)?),
            final_wait: Duration::from_micros(cfg.get("final_wait", 10_000)?),
            block_num: cfg.get("block_num", 1000)?,
            progress: true,
        })
    }
}

/// Results of a finished run.
pub struct SimOutcome {
    pub blocks_done: u64,
    pub tx_done: u64,
    pub report: ChainReport,
    pub honest: BTreeSet<NodeId>,
    pub selfish: BTreeSet<NodeId>,
    pub edge_count: usize,
    pub honest_power: u64,
    pub selfish_power: u64,
    /// Per-node chain state, indexed by node id.
    pub states: Vec<Arc<TinyState>>,
    pub coordinator: Option<Arc<SelfishCoordinator>>,
}

/// Execute a whole TinyCoin scenario and return its outcome.
pub fn run_simulation(settings: &SimSettings) -> Result<SimOutcome, DriverError> {
    if install_params(settings.params.clone()).is_err() {
        debug!("simulation parameters already installed; keeping the first set");
    }
    let mut rng = Xoroshiro128Plus::from_pair(u64::MAX, settings.seed);
    let n = settings.network_size;
    let edges = match settings.network_kind {
        NetworkKind::Erdos => connected_erdos(n, settings.network_connectivity, &mut rng),
        NetworkKind::Barabasi => barabasi_albert(n, settings.network_connectivity, &mut rng),
    };

    let num_miners = (n as f64 * settings.miners_percent) as u64;
    if num_miners == 0 {
        return Err(DriverError::NoMiners);
    }
    let num_selfish = (num_miners as f64 * settings.selfish_percent) as u64;
    let num_honest = num_miners - num_selfish;
    let (honest, selfish) = choose_miners(
        &mut rng,
        n,
        num_honest,
        num_selfish,
        &edges,
        settings.selfish_placement,
    );
    let (mut honest_powers, mut selfish_powers) = assign_hash_power(
        &mut rng,
        num_honest,
        num_selfish,
        settings.selfish_power_percent,
    )?;
    let honest_power: u64 = honest_powers.iter().sum();
    let selfish_power: u64 = selfish_powers.iter().sum();

    info!(
        nodes = n,
        edges = edges.len(),
        honest_miners = num_honest,
        selfish_miners = num_selfish,
        honest_power,
        selfish_power,
        seed = settings.seed,
        "starting tinycoin simulation"
    );

    let coordinator = (num_selfish > 0).then(SelfishCoordinator::new);
    let hwm = GraphHardwareManager::<TinyData>::new(settings.nthreads, settings.seed);
    let mut weights: Vec<u64> = Vec::with_capacity(n as usize);
    let mut states: Vec<Arc<TinyState>> = Vec::with_capacity(n as usize);
    for i in 0..n {
        let node_seed = rng.next_u64();
        if honest.contains(&i) {
            let power = honest_powers
                .pop()
                .expect("honest power draws match the honest miner count");
            let miner = TinyMiner::honest(i, node_seed, power);
            weights.push(power);
            states.push(miner.state());
            hwm.add_node_seq(Box::new(miner))?;
        } else if selfish.contains(&i) {
            let power = selfish_powers
                .pop()
                .expect("selfish power draws match the selfish miner count");
            let coordinator = coordinator
                .as_ref()
                .expect("a coalition exists whenever selfish miners do");
            let miner = selfish_miner(i, node_seed, power, coordinator);
            weights.push(power);
            states.push(miner.state());
            hwm.add_node_seq(Box::new(miner))?;
        } else {
            let node = TinyNode::new(i, node_seed);
            weights.push(0);
            states.push(node.state());
            hwm.add_node_seq(Box::new(node))?;
        }
    }
    for i in 1..weights.len() {
        weights[i] += weights[i - 1];
    }
    for &(a, b) in &edges {
        hwm.add_edge(a, b)?;
    }
    hwm.run()?;

    let blocks_done = Arc::new(AtomicU64::new(0));
    let tx_done = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let status = settings.progress.then(|| {
        let blocks_done = Arc::clone(&blocks_done);
        let tx_done = Arc::clone(&tx_done);
        let done = Arc::clone(&done);
        let block_num = settings.block_num;
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                print!(
                    "\r{:>9}/{:>9} blocks, {:>12} transactions, {:>12}/{:>12} events left",
                    blocks_done.load(Ordering::Relaxed),
                    block_num,
                    tx_done.load(Ordering::Relaxed),
                    queued_messages(),
                    distsim_engine::all_messages(),
                );
                let _ = std::io::stdout().flush();
                thread::sleep(Duration::from_millis(100));
            }
            println!();
        })
    });

    let mut last_block = Instant::now();
    while blocks_done.load(Ordering::Relaxed) < settings.block_num {
        let now = Instant::now();
        if now > last_block + settings.block_interval {
            let miner = choose_weighted(&mut rng, &weights) as NodeId;
            hwm.gen_message_with(miner, TinyData::MineBlock)?;
            last_block = now;
            blocks_done.fetch_add(1, Ordering::Relaxed);
        }
        let origin = hwm.random_node()?;
        hwm.gen_message_with(origin, TinyData::NewTransaction)?;
        tx_done.fetch_add(1, Ordering::Relaxed);
        thread::sleep(settings.transaction_interval);
    }

    thread::sleep(settings.final_wait);
    if let Some(coordinator) = &coordinator {
        coordinator.flush_chain(&*hwm)?;
    }

    // Let the delayed backlog drain before freezing the chains. The counter
    // dips to zero between a delivery and the re-broadcasts it triggers, so
    // only a sustained zero counts.
    let drain_deadline = Instant::now() + Duration::from_secs(60);
    let mut stable = 0;
    while stable < 20 && Instant::now() < drain_deadline {
        if queued_messages() == 0 {
            stable += 1;
        } else {
            stable = 0;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done.store(true, Ordering::Release);
    if let Some(handle) = status {
        let _ = handle.join();
    }
    hwm.stop();

    let snapshot = states[0].chain_snapshot();
    let report = analyze_chain(&snapshot, &selfish);
    Ok(SimOutcome {
        blocks_done: blocks_done.load(Ordering::Relaxed),
        tx_done: tx_done.load(Ordering::Relaxed),
        report,
        honest,
        selfish,
        edge_count: edges.len(),
        honest_power,
        selfish_power,
        states,
        coordinator,
    })
}
