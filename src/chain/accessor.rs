//! Ethereum read access with node/explorer dispatch
//!
//! Every read picks its backend from the connectivity state at call time: a
//! connected node is preferred and the block explorer is the fallback.

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::rpc::types::{Block, Log};
use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::JsonAbi;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::chain::backend::{ChainBackend, ExplorerBackend, NodeBackend};
use crate::config::Config;
use crate::core::MessagesAggregator;
use crate::domain::{BalanceMap, LogQuery, TokenDescriptor};
use crate::error::{ChainError, RemoteError};
use crate::infrastructure::abi::find_function;
use crate::infrastructure::ethereum::{ConnectOutcome, HttpConnector, NodeConnection};
use crate::infrastructure::explorer::{BlockHeightOracle, EtherscanClient, RemoteExplorer};

/// Ethereum chain accessor
pub struct ChainAccessor {
    node: NodeConnection,
    explorer: Arc<dyn RemoteExplorer>,
}

impl ChainAccessor {
    pub fn new(node: NodeConnection, explorer: Arc<dyn RemoteExplorer>) -> Self {
        Self { node, explorer }
    }

    /// Build a disconnected accessor wired to the configured services
    ///
    /// Call [`ChainAccessor::attempt_connect`] afterwards to use a node.
    pub fn from_config(
        config: &Config,
        messages: Arc<dyn MessagesAggregator>,
    ) -> Result<Self, RemoteError> {
        let timeout = config.rpc_timeout();
        let explorer: Arc<dyn RemoteExplorer> = Arc::new(EtherscanClient::new(
            config.explorer.base_url.clone(),
            config.explorer.api_key.clone(),
            timeout,
        )?);
        let oracle = BlockHeightOracle::new(
            config.highest_block_url.clone(),
            Arc::clone(&explorer),
            timeout,
        )?;
        let node = NodeConnection::new(
            config.rpc_endpoint.clone(),
            timeout,
            Arc::new(HttpConnector),
            Arc::new(oracle),
            messages,
        );
        Ok(Self::new(node, explorer))
    }

    pub async fn attempt_connect(&mut self, endpoint: &str, verify_mainnet: bool) -> ConnectOutcome {
        self.node.attempt_connect(endpoint, verify_mainnet).await
    }

    /// Switch to a new node endpoint, verifying it is a synced mainnet node
    pub async fn set_rpc_endpoint(&mut self, endpoint: &str) -> ConnectOutcome {
        let outcome = self.node.attempt_connect(endpoint, true).await;
        if outcome.connected {
            info!(endpoint, "Setting ETH RPC endpoint");
        }
        outcome
    }

    pub fn is_connected(&self) -> bool {
        self.node.is_connected()
    }

    pub fn node(&self) -> &NodeConnection {
        &self.node
    }

    /// The backend reads go through right now
    pub fn backend(&self) -> Box<dyn ChainBackend> {
        match self.node.provider() {
            Some(provider) => Box::new(NodeBackend::new(provider)),
            None => Box::new(ExplorerBackend::new(Arc::clone(&self.explorer))),
        }
    }

    /// Native balance in ether
    pub async fn get_balance(&self, address: Address) -> Result<Decimal, ChainError> {
        self.backend().get_balance(address).await
    }

    pub async fn get_balances(&self, addresses: &[Address]) -> Result<BalanceMap, ChainError> {
        self.backend().get_balances(addresses).await
    }

    /// Balance of `owner` in `token`, scaled by the token decimals. Zero is a valid result.
    pub async fn get_token_balance(
        &self,
        token: &TokenDescriptor,
        owner: Address,
    ) -> Result<Decimal, ChainError> {
        self.backend().get_token_balance(token, owner).await
    }

    /// Balances of `token` for many owners; owners holding none are left out
    ///
    /// A balance too large for `Decimal` is logged and left out as well.
    pub async fn get_token_balances(
        &self,
        token: &TokenDescriptor,
        owners: &[Address],
    ) -> Result<BalanceMap, ChainError> {
        let backend = self.backend();
        let mut balances = BalanceMap::new();
        for owner in owners {
            let amount = match backend.get_token_balance(token, *owner).await {
                Ok(amount) => amount,
                Err(ChainError::Amount(err)) => {
                    warn!(%owner, token = %token.symbol, error = %err, "Skipping unrepresentable token balance");
                    continue;
                }
                Err(err) => return Err(err),
            };
            debug!(
                backend = backend.name(),
                %owner,
                token = %token.symbol,
                %amount,
                "Token balance"
            );
            if !amount.is_zero() {
                balances.insert(*owner, amount);
            }
        }
        Ok(balances)
    }

    /// Deployed bytecode, 0x-prefixed
    pub async fn get_code(&self, address: Address) -> Result<String, ChainError> {
        self.backend().get_code(address).await
    }

    /// Call a read-only contract method and return its single output value
    pub async fn call_contract_method(
        &self,
        contract: Address,
        abi: &JsonAbi,
        method: &str,
        arguments: &[DynSolValue],
    ) -> Result<DynSolValue, ChainError> {
        let function = find_function(abi, method, arguments.len())?;
        self.backend()
            .call_contract_method(contract, function, arguments)
            .await
    }

    /// Event logs of one contract. Always empty without a node.
    pub async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, ChainError> {
        self.backend().get_logs(query).await
    }

    /// Block by number. Node only; `None` when disconnected.
    pub async fn get_block_by_number(&self, number: u64) -> Result<Option<Block>, ChainError> {
        match self.node.provider() {
            Some(provider) => provider.get_block(number).await.map_err(ChainError::node),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::time::Duration;

    use alloy::primitives::{Bytes, B256, U256};
    use alloy::rpc::types::TransactionRequest;
    use anyhow::Result;

    use crate::core::MessageQueue;
    use crate::domain::{LogFilter, SyncProgress};
    use crate::infrastructure::abi::token_abi;
    use crate::infrastructure::ethereum::{EthereumProvider, NodeConnector};
    use crate::infrastructure::explorer::HighestBlockSource;

    const TOKEN: Address = Address::repeat_byte(0xdd);
    const ALICE: Address = Address::repeat_byte(0x01);
    const BOB: Address = Address::repeat_byte(0x02);

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn word(value: u128) -> Bytes {
        Bytes::from(B256::from(U256::from(value)).to_vec())
    }

    /// Mainnet node holding ether and one token
    #[derive(Default)]
    struct FakeNode {
        ether: HashMap<Address, U256>,
        tokens: HashMap<Address, u128>,
        calls: Mutex<Vec<TransactionRequest>>,
    }

    #[async_trait::async_trait]
    impl EthereumProvider for FakeNode {
        async fn client_version(&self) -> Result<String> {
            Ok("fake".to_string())
        }
        async fn chain_id(&self) -> Result<u64> {
            Ok(1)
        }
        async fn sync_status(&self) -> Result<Option<SyncProgress>> {
            Ok(None)
        }
        async fn block_number(&self) -> Result<u64> {
            Ok(100)
        }
        async fn get_balance(&self, address: Address) -> Result<U256> {
            Ok(self.ether.get(&address).copied().unwrap_or_default())
        }
        async fn get_code(&self, _address: Address) -> Result<Bytes> {
            Ok(Bytes::from(vec![0x60, 0x80]))
        }
        async fn call(&self, request: TransactionRequest) -> Result<Bytes> {
            let input = request.input.input().cloned().unwrap_or_default();
            self.calls.lock().unwrap().push(request);
            // balanceOf(owner): owner is the last 20 bytes of the first argument
            let owner = Address::from_slice(&input[16..36]);
            Ok(word(self.tokens.get(&owner).copied().unwrap_or_default()))
        }
        async fn get_logs(&self, _filter: &LogFilter) -> Result<Vec<Log>> {
            Ok(vec![Log::default()])
        }
        async fn get_block(&self, number: u64) -> Result<Option<Block>> {
            anyhow::bail!("block {} is pruned", number)
        }
        fn endpoint_name(&self) -> String {
            "fake".to_string()
        }
    }

    struct FakeConnector(Arc<FakeNode>);

    #[async_trait::async_trait]
    impl NodeConnector for FakeConnector {
        async fn connect(&self, _endpoint: &str, _timeout: Duration) -> Result<Arc<dyn EthereumProvider>> {
            Ok(self.0.clone())
        }
    }

    struct AtHead;

    #[async_trait::async_trait]
    impl HighestBlockSource for AtHead {
        async fn query_highest_block(&self) -> Option<u64> {
            Some(100)
        }
    }

    #[derive(Default)]
    struct FakeExplorer {
        ether: HashMap<Address, U256>,
        tokens: HashMap<Address, U256>,
        call_result: String,
    }

    #[async_trait::async_trait]
    impl RemoteExplorer for FakeExplorer {
        async fn get_account_balance(&self, address: Address) -> Result<U256, RemoteError> {
            Ok(self.ether.get(&address).copied().unwrap_or_default())
        }
        async fn get_accounts_balance(
            &self,
            addresses: &[Address],
        ) -> Result<HashMap<Address, U256>, RemoteError> {
            Ok(addresses
                .iter()
                .filter_map(|a| self.ether.get(a).map(|b| (*a, *b)))
                .collect())
        }
        async fn get_token_balance(&self, _token: Address, owner: Address) -> Result<U256, RemoteError> {
            Ok(self.tokens.get(&owner).copied().unwrap_or_default())
        }
        async fn get_code(&self, _address: Address) -> Result<String, RemoteError> {
            Ok("0x".to_string())
        }
        async fn eth_call(&self, _to: Address, _data: &Bytes) -> Result<String, RemoteError> {
            Ok(self.call_result.clone())
        }
        async fn get_latest_block_number(&self) -> Result<u64, RemoteError> {
            Ok(100)
        }
    }

    fn accessor(node: FakeNode, explorer: FakeExplorer) -> ChainAccessor {
        let connection = NodeConnection::new(
            "http://localhost:8545",
            Duration::from_secs(1),
            Arc::new(FakeConnector(Arc::new(node))),
            Arc::new(AtHead),
            Arc::new(MessageQueue::new()),
        );
        ChainAccessor::new(connection, Arc::new(explorer))
    }

    fn dai() -> TokenDescriptor {
        TokenDescriptor::new(TOKEN, 18, "DAI")
    }

    #[tokio::test]
    async fn test_disconnected_reads_use_explorer() {
        let explorer = FakeExplorer {
            ether: HashMap::from([(ALICE, U256::from(2_000_000_000_000_000_000u128))]),
            ..Default::default()
        };
        let accessor = accessor(FakeNode::default(), explorer);

        assert!(!accessor.is_connected());
        assert_eq!(accessor.backend().name(), "etherscan");
        assert_eq!(accessor.get_balance(ALICE).await.unwrap(), dec("2"));
        assert_eq!(accessor.get_code(ALICE).await.unwrap(), "0x");
        assert!(accessor.get_block_by_number(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connected_reads_use_node() {
        let node = FakeNode {
            ether: HashMap::from([(ALICE, U256::from(500_000_000_000_000_000u128))]),
            ..Default::default()
        };
        let mut accessor = accessor(node, FakeExplorer::default());

        let outcome = accessor.attempt_connect("http://localhost:8545", true).await;
        assert!(outcome.connected);

        assert_eq!(accessor.backend().name(), "node");
        assert_eq!(accessor.get_balance(ALICE).await.unwrap(), dec("0.5"));
        assert_eq!(accessor.get_code(ALICE).await.unwrap(), "0x6080");
        let err = accessor.get_block_by_number(1).await.unwrap_err();
        assert_eq!(err.to_string(), "node request failed: block 1 is pruned");
    }

    #[tokio::test]
    async fn test_explorer_balances_omit_missing_accounts() {
        let explorer = FakeExplorer {
            ether: HashMap::from([(ALICE, U256::from(1_000_000_000_000_000_000u128))]),
            ..Default::default()
        };
        let accessor = accessor(FakeNode::default(), explorer);

        let balances = accessor.get_balances(&[ALICE, BOB]).await.unwrap();

        assert_eq!(balances.len(), 1);
        assert_eq!(balances[&ALICE], dec("1"));
    }

    #[tokio::test]
    async fn test_node_balances_cover_every_address() {
        let node = FakeNode {
            ether: HashMap::from([(ALICE, U256::from(3_000_000_000_000_000_000u128))]),
            ..Default::default()
        };
        let mut accessor = accessor(node, FakeExplorer::default());
        assert!(accessor.attempt_connect("http://localhost:8545", true).await.connected);

        let balances = accessor.get_balances(&[ALICE, BOB]).await.unwrap();

        assert_eq!(balances.len(), 2);
        assert_eq!(balances[&ALICE], dec("3"));
        assert_eq!(balances[&BOB], Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_token_balances_exclude_zero_on_node() {
        let node = FakeNode {
            tokens: HashMap::from([(ALICE, 1_250_000_000_000_000_000u128)]),
            ..Default::default()
        };
        let mut accessor = accessor(node, FakeExplorer::default());
        accessor.attempt_connect("http://localhost:8545", true).await;

        let balances = accessor.get_token_balances(&dai(), &[ALICE, BOB]).await.unwrap();

        assert_eq!(balances.len(), 1);
        assert_eq!(balances[&ALICE], dec("1.25"));
        // A single lookup still reports zero
        assert_eq!(accessor.get_token_balance(&dai(), BOB).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_token_balances_exclude_zero_on_explorer() {
        let explorer = FakeExplorer {
            tokens: HashMap::from([(BOB, U256::from(3_000_000u64))]),
            ..Default::default()
        };
        let accessor = accessor(FakeNode::default(), explorer);
        let usdc = TokenDescriptor::new(TOKEN, 6, "USDC");

        let balances = accessor.get_token_balances(&usdc, &[ALICE, BOB]).await.unwrap();

        assert_eq!(balances, BalanceMap::from([(BOB, dec("3"))]));
    }

    #[tokio::test]
    async fn test_token_balances_skip_unrepresentable_amount() {
        let explorer = FakeExplorer {
            tokens: HashMap::from([(ALICE, U256::from(7u64)), (BOB, U256::MAX)]),
            ..Default::default()
        };
        let accessor = accessor(FakeNode::default(), explorer);
        let spam = TokenDescriptor::new(TOKEN, 0, "SPAM");

        let balances = accessor.get_token_balances(&spam, &[ALICE, BOB]).await.unwrap();

        assert_eq!(balances, BalanceMap::from([(ALICE, dec("7"))]));
        assert!(matches!(
            accessor.get_token_balance(&spam, BOB).await,
            Err(ChainError::Amount(_))
        ));
    }

    #[tokio::test]
    async fn test_explorer_contract_call_decodes_output() {
        let explorer = FakeExplorer {
            call_result: format!("0x{}", hex::encode(word(18))),
            ..Default::default()
        };
        let accessor = accessor(FakeNode::default(), explorer);

        let value = accessor
            .call_contract_method(TOKEN, token_abi().unwrap(), "decimals", &[])
            .await
            .unwrap();

        assert_eq!(value, DynSolValue::Uint(U256::from(18u64), 8));
    }

    #[tokio::test]
    async fn test_contract_call_unknown_method() {
        let accessor = accessor(FakeNode::default(), FakeExplorer::default());
        let err = accessor
            .call_contract_method(TOKEN, token_abi().unwrap(), "mint", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Abi(_)));
    }

    #[tokio::test]
    async fn test_logs_empty_without_node() {
        let mut accessor = accessor(FakeNode::default(), FakeExplorer::default());
        let query = LogQuery::new(TOKEN, token_abi().unwrap().clone(), "Transfer");

        assert!(accessor.get_logs(&query).await.unwrap().is_empty());

        accessor.attempt_connect("http://localhost:8545", true).await;
        assert_eq!(accessor.get_logs(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_rpc_endpoint() {
        let mut accessor = accessor(FakeNode::default(), FakeExplorer::default());

        let outcome = accessor.set_rpc_endpoint("http://other:8545").await;

        assert!(outcome.connected);
        assert_eq!(accessor.node().endpoint(), "http://other:8545");
    }
}
