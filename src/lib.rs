//! Read-only Ethereum access with block explorer fallback
//!
//! [`chain::ChainAccessor`] answers balance, code, contract call and log
//! queries through a verified mainnet node when one is reachable and through
//! an Etherscan-compatible explorer otherwise.
//! [`modules::gitcoin::GitcoinDataImporter`] loads Gitcoin grant exports into
//! a local ledger.

pub mod chain;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod logging;
pub mod modules;
pub mod store;
