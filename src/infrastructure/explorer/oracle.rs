//! Network head height lookup

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::infrastructure::explorer::RemoteExplorer;

/// Default block height service
pub const DEFAULT_HIGHEST_BLOCK_URL: &str = "https://api.blockcypher.com/v1/eth/main";

const SERVICE: &str = "blockcypher";

/// Source of the current mainnet head height
#[async_trait::async_trait]
pub trait HighestBlockSource: Send + Sync {
    /// `None` when no source could answer
    async fn query_highest_block(&self) -> Option<u64>;
}

#[derive(Debug, Deserialize)]
struct ChainSummary {
    height: u64,
}

/// Asks a block height service first and the block explorer second
pub struct BlockHeightOracle {
    http: reqwest::Client,
    url: String,
    explorer: Arc<dyn RemoteExplorer>,
}

impl BlockHeightOracle {
    pub fn new(
        url: Option<String>,
        explorer: Arc<dyn RemoteExplorer>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::request(SERVICE, e.to_string()))?;
        Ok(Self {
            http,
            url: url.unwrap_or_else(|| DEFAULT_HIGHEST_BLOCK_URL.to_string()),
            explorer,
        })
    }

    async fn query_service(&self) -> Result<u64, RemoteError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RemoteError::request(SERVICE, e.to_string()))?;
        if !response.status().is_success() {
            return Err(RemoteError::request(
                SERVICE,
                format!("HTTP {}", response.status()),
            ));
        }
        let summary: ChainSummary = response
            .json()
            .await
            .map_err(|e| RemoteError::invalid_response(SERVICE, e.to_string()))?;
        Ok(summary.height)
    }
}

#[async_trait::async_trait]
impl HighestBlockSource for BlockHeightOracle {
    async fn query_highest_block(&self) -> Option<u64> {
        match self.query_service().await {
            Ok(height) => {
                debug!(height, "Highest block from block height service");
                return Some(height);
            }
            Err(err) => warn!(error = %err, "Block height service failed, asking etherscan"),
        }

        match self.explorer.get_latest_block_number().await {
            Ok(height) => {
                debug!(height, "Highest block from etherscan");
                Some(height)
            }
            Err(err) => {
                warn!(error = %err, "Could not determine the highest block");
                None
            }
        }
    }
}
