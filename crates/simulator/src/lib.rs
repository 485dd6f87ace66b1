//! Scenario drivers and tooling around the protocol simulations.
//!
//! This crate holds everything a runnable experiment needs beyond the
//! protocol crates themselves: the plain-text [`Config`] format, hash-power
//! assignment, miner placement, post-run chain [`analysis`], and the
//! [`driver`] executing a full TinyCoin scenario. The binaries (`tinycoin`,
//! `chord-hops`, `graph-gen`) are thin CLI shells over these modules.

pub mod analysis;
pub mod config;
pub mod driver;
pub mod hashpower;
pub mod miners;

pub use analysis::{analyze_chain, ChainReport};
pub use config::{Config, ConfigError};
pub use driver::{run_simulation, DriverError, NetworkKind, SimOutcome, SimSettings};
pub use hashpower::{assign_hash_power, HashPowerError};
pub use miners::{choose_miners, SelfishPlacement};
