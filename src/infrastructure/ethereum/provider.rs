//! Ethereum provider abstraction and the Alloy HTTP implementation
//!
//! Only the read-only JSON-RPC surface the chain accessor needs is exposed.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::{Block, Filter, Log, SyncStatus, TransactionRequest};
use alloy::transports::http::{reqwest, Http};
use anyhow::{Context, Result};

use crate::domain::{LogFilter, SyncProgress};

/// Provider configuration
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    /// HTTP JSON-RPC endpoint with a per-request timeout
    Http { url: String, timeout: Duration },
}

/// Abstract Ethereum provider trait
///
/// The read-only node operations the accessor dispatches to, abstracting over
/// the concrete Alloy transport.
#[async_trait::async_trait]
pub trait EthereumProvider: Send + Sync + 'static {
    /// Get client version; doubles as the reachability probe
    async fn client_version(&self) -> Result<String>;

    /// Get the numeric chain identity
    async fn chain_id(&self) -> Result<u64>;

    /// Get sync status (None if the node is not syncing)
    async fn sync_status(&self) -> Result<Option<SyncProgress>>;

    /// Get the current block number
    async fn block_number(&self) -> Result<u64>;

    /// Get account balance in wei
    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// Get deployed bytecode
    async fn get_code(&self, address: Address) -> Result<Bytes>;

    /// Execute a call (eth_call)
    async fn call(&self, request: TransactionRequest) -> Result<Bytes>;

    /// Fetch logs for one closed block range
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>>;

    /// Get a block header with transaction hashes
    async fn get_block(&self, number: u64) -> Result<Option<Block>>;

    /// Get endpoint display name
    fn endpoint_name(&self) -> String;
}

/// Alloy-backed provider over HTTP
pub struct AlloyProvider {
    provider: DynProvider,
    endpoint: String,
}

/// Create a provider from configuration
///
/// Building the HTTP transport does not touch the network; reachability is
/// checked by the caller.
pub fn create_provider(config: ProviderConfig) -> Result<Box<dyn EthereumProvider>> {
    match config {
        ProviderConfig::Http { url, timeout } => {
            let rpc_url = url.parse().context("Invalid HTTP URL")?;
            let http_client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client")?;
            let transport = Http::with_client(http_client, rpc_url);
            let client = RpcClient::new(transport, false);
            let provider = ProviderBuilder::new()
                .disable_recommended_fillers()
                .connect_client(client)
                .erased();
            Ok(Box::new(AlloyProvider {
                provider,
                endpoint: url,
            }))
        }
    }
}

#[async_trait::async_trait]
impl EthereumProvider for AlloyProvider {
    async fn client_version(&self) -> Result<String> {
        Ok(self.provider.get_client_version().await?)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn sync_status(&self) -> Result<Option<SyncProgress>> {
        match self.provider.syncing().await? {
            SyncStatus::None => Ok(None),
            SyncStatus::Info(info) => Ok(Some(SyncProgress {
                current_block: info.current_block.saturating_to::<u64>(),
                highest_block: info.highest_block.saturating_to::<u64>(),
            })),
        }
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes> {
        Ok(self.provider.call(request).await?)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        let filter = to_alloy_filter(filter);
        Ok(self.provider.get_logs(&filter).await?)
    }

    async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        Ok(self.provider.get_block_by_number(number.into()).await?)
    }

    fn endpoint_name(&self) -> String {
        self.endpoint.clone()
    }
}

/// Translate our range filter into an Alloy filter
fn to_alloy_filter(filter: &LogFilter) -> Filter {
    let mut out = Filter::new()
        .address(filter.address)
        .from_block(filter.from_block)
        .to_block(filter.to_block);
    for (index, topic) in filter.topics.iter().enumerate().take(4) {
        if let Some(topic) = topic {
            out.topics[index] = (*topic).into();
        }
    }
    out
}
