//! Ethereum infrastructure - Alloy provider and node connection handling

pub mod node;
mod provider;

pub use node::{
    is_synchronized, normalize_endpoint, ConnectOutcome, HttpConnector, NodeConnection,
    NodeConnector, NodeState, SyncHealth, DEFAULT_RPC_TIMEOUT, MAINNET_CHAIN_ID,
    SYNC_TOLERANCE_BLOCKS,
};
pub use provider::{create_provider, EthereumProvider, ProviderConfig};
