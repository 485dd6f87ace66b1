//! TinyCoin: a proof-of-work blockchain simulated over the dispatch engine.
//!
//! Every node relays first-sight gossip (transactions and blocks) to its
//! neighbours and maintains longest-chain state with fork handling and
//! balance rollback. Miners additionally run a [`MinerPolicy`] deciding how
//! to assemble and when to reveal blocks:
//!
//! - [`HonestPolicy`] mines on the public head and reveals immediately;
//! - [`SelfishPolicy`] routes everything through a shared
//!   [`SelfishCoordinator`] implementing the classic withholding strategy.
//!
//! Mining is driven externally: the driver picks a miner (weighted by hash
//! power) and injects a [`TinyData::MineBlock`] trigger; transaction traffic
//! is injected as [`TinyData::NewTransaction`] triggers at random nodes.

mod node;
mod params;
mod policy;
mod selfish;
mod state;
mod types;

pub use node::{TinyMiner, TinyNode};
pub use params::{install_params, params, ParamsAlreadyInstalled, TinyParams};
pub use policy::{HonestPolicy, MinerPolicy, PolicyContext};
pub use selfish::{selfish_miner, SelfishCoordinator, SelfishPolicy};
pub use state::{ChainSnapshot, Slot, TinyState};
pub use types::{BlockId, TinyBlock, TinyData, TinyTransaction, TxId, GENESIS_ID};
