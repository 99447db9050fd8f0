//! Remote HTTP services used when no node is available

mod etherscan;
mod oracle;

pub use etherscan::{EtherscanClient, RemoteExplorer, BALANCEMULTI_BATCH, DEFAULT_ETHERSCAN_URL};
pub use oracle::{BlockHeightOracle, HighestBlockSource, DEFAULT_HIGHEST_BLOCK_URL};
