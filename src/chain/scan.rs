//! Chunked `eth_getLogs` scanning
//!
//! Nodes reject or time out on very wide log ranges, so a query is split into
//! consecutive closed ranges of at most `MAX_BLOCKS_PER_QUERY + 1` blocks and
//! fetched in ascending order.

use alloy::rpc::types::Log;
use tracing::debug;

use crate::domain::{BlockTag, LogFilter, LogQuery};
use crate::error::ChainError;
use crate::infrastructure::abi::{event_topics, find_event};
use crate::infrastructure::ethereum::EthereumProvider;

/// Offset from a chunk's first block to its last block
pub const MAX_BLOCKS_PER_QUERY: u64 = 250_000;

/// Closed block ranges covering `[from, to]`
#[derive(Debug, Clone)]
pub struct BlockChunks {
    next: Option<u64>,
    to: u64,
    step: u64,
}

impl BlockChunks {
    pub fn new(from: u64, to: u64, step: u64) -> Self {
        Self {
            next: (from <= to).then_some(from),
            to,
            step,
        }
    }
}

impl Iterator for BlockChunks {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next?;
        let end = start.saturating_add(self.step).min(self.to);
        self.next = if end < self.to { Some(end + 1) } else { None };
        Some((start, end))
    }
}

/// Fetch every log of `query` through `provider`
pub async fn scan_logs(
    provider: &dyn EthereumProvider,
    query: &LogQuery,
) -> Result<Vec<Log>, ChainError> {
    let event = find_event(&query.abi, &query.event_name)?;
    let topics = event_topics(event, &query.argument_filters)?;

    let to_block = match query.to_block {
        BlockTag::Number(number) => number,
        BlockTag::Latest => provider.block_number().await.map_err(ChainError::node)?,
    };

    let mut logs = Vec::new();
    for (start, end) in BlockChunks::new(query.from_block, to_block, MAX_BLOCKS_PER_QUERY) {
        let filter = LogFilter {
            address: query.contract_address,
            topics: topics.clone(),
            from_block: start,
            to_block: end,
        };
        let chunk = provider.get_logs(&filter).await.map_err(ChainError::node)?;
        debug!(
            event = %query.event_name,
            from = start,
            to = end,
            count = chunk.len(),
            "Fetched log chunk"
        );
        logs.extend(chunk);
    }

    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use alloy::primitives::{Address, Bytes, B256, U256};
    use alloy::rpc::types::{Block, TransactionRequest};
    use alloy_primitives::keccak256;
    use anyhow::Result;

    use crate::domain::SyncProgress;
    use crate::infrastructure::abi::token_abi;

    /// Returns one log per requested range, tagged with the range start
    struct RecordingNode {
        head: u64,
        requests: Mutex<Vec<LogFilter>>,
    }

    impl RecordingNode {
        fn new(head: u64) -> Self {
            Self {
                head,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl EthereumProvider for RecordingNode {
        async fn client_version(&self) -> Result<String> {
            Ok("test".to_string())
        }
        async fn chain_id(&self) -> Result<u64> {
            Ok(1)
        }
        async fn sync_status(&self) -> Result<Option<SyncProgress>> {
            Ok(None)
        }
        async fn block_number(&self) -> Result<u64> {
            Ok(self.head)
        }
        async fn get_balance(&self, _address: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }
        async fn get_code(&self, _address: Address) -> Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn call(&self, _request: TransactionRequest) -> Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
            self.requests.lock().unwrap().push(filter.clone());
            Ok(vec![Log {
                block_number: Some(filter.from_block),
                ..Default::default()
            }])
        }
        async fn get_block(&self, _number: u64) -> Result<Option<Block>> {
            Ok(None)
        }
        fn endpoint_name(&self) -> String {
            "recording".to_string()
        }
    }

    #[test]
    fn test_chunks_cover_range() {
        let chunks: Vec<_> = BlockChunks::new(0, 600_000, MAX_BLOCKS_PER_QUERY).collect();
        assert_eq!(
            chunks,
            vec![(0, 250_000), (250_001, 500_001), (500_002, 600_000)]
        );
    }

    #[test]
    fn test_chunks_single_block_and_empty() {
        assert_eq!(BlockChunks::new(7, 7, 10).collect::<Vec<_>>(), vec![(7, 7)]);
        assert_eq!(BlockChunks::new(8, 7, 10).count(), 0);
    }

    #[test]
    fn test_chunks_stop_at_u64_max() {
        let chunks: Vec<_> = BlockChunks::new(u64::MAX - 3, u64::MAX, 10).collect();
        assert_eq!(chunks, vec![(u64::MAX - 3, u64::MAX)]);
    }

    #[tokio::test]
    async fn test_scan_logs_chunks_in_order() {
        let node = RecordingNode::new(0);
        let query = LogQuery::new(Address::repeat_byte(0x44), token_abi().unwrap().clone(), "Transfer")
            .from_block(0)
            .to_block(BlockTag::Number(600_000));

        let logs = scan_logs(&node, &query).await.unwrap();

        let starts: Vec<_> = logs.iter().map(|l| l.block_number.unwrap()).collect();
        assert_eq!(starts, vec![0, 250_001, 500_002]);

        let requests = node.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].to_block, 600_000);
        assert_eq!(
            requests[0].topics,
            vec![Some(keccak256("Transfer(address,address,uint256)"))]
        );
    }

    #[tokio::test]
    async fn test_scan_logs_resolves_latest() {
        let node = RecordingNode::new(1_000);
        let query = LogQuery::new(Address::ZERO, token_abi().unwrap().clone(), "Approval")
            .from_block(900)
            .with_filter("owner", "0x1111111111111111111111111111111111111111");

        let logs = scan_logs(&node, &query).await.unwrap();

        assert_eq!(logs.len(), 1);
        let requests = node.requests.lock().unwrap();
        assert_eq!((requests[0].from_block, requests[0].to_block), (900, 1_000));
        assert_eq!(requests[0].topics.len(), 2);
        assert_ne!(requests[0].topics[1], None::<B256>);
    }

    #[tokio::test]
    async fn test_scan_logs_unknown_event() {
        let node = RecordingNode::new(1_000);
        let query = LogQuery::new(Address::ZERO, token_abi().unwrap().clone(), "Mint");

        let err = scan_logs(&node, &query).await.unwrap_err();
        assert!(matches!(err, ChainError::Abi(_)));
        assert!(node.requests.lock().unwrap().is_empty());
    }
}
