//! Process-wide simulation parameters.
//!
//! Delays, rewards and the per-block transaction cap are fixed for a whole
//! simulation run. The driver installs them once before building the
//! network; everything else reads them through [`params`]. They are never
//! reset mid-run.

use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Tunables shared by every TinyCoin node in the process.
#[derive(Debug, Clone)]
pub struct TinyParams {
    /// Added to a block's propagation delay per carried transaction.
    pub delay_per_transaction: Duration,
    /// Flat part of a block's propagation delay.
    pub base_delay: Duration,
    /// Propagation delay of a transaction message.
    pub transaction_delay: Duration,
    /// Paid to the miner when a block is confirmed.
    pub block_reward: f64,
    /// Paid to the miner per confirmed transaction.
    pub transaction_reward: f64,
    /// Maximum transactions packed into a mined block.
    pub transactions_per_block: usize,
}

impl Default for TinyParams {
    fn default() -> Self {
        Self {
            delay_per_transaction: Duration::from_nanos(20),
            base_delay: Duration::from_nanos(100),
            transaction_delay: Duration::from_nanos(20),
            block_reward: 1.0,
            transaction_reward: 0.01,
            transactions_per_block: 50,
        }
    }
}

static PARAMS: OnceLock<TinyParams> = OnceLock::new();

/// Raised when a second parameter set is installed in the same process.
#[derive(Debug, Error)]
#[error("simulation parameters were already installed")]
pub struct ParamsAlreadyInstalled;

/// Install the process-wide parameters. Call once, before any node exists.
pub fn install_params(params: TinyParams) -> Result<(), ParamsAlreadyInstalled> {
    PARAMS.set(params).map_err(|_| ParamsAlreadyInstalled)
}

/// The installed parameters, or the defaults if none were installed.
pub fn params() -> &'static TinyParams {
    PARAMS.get_or_init(TinyParams::default)
}
