//! Node connection state machine
//!
//! Owns the provider handle for the configured node and decides whether the
//! accessor may use it: the node must answer, be on mainnet, and be within
//! [`SYNC_TOLERANCE_BLOCKS`] of the network head.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::MessagesAggregator;
use crate::infrastructure::ethereum::provider::{create_provider, EthereumProvider, ProviderConfig};
use crate::infrastructure::explorer::HighestBlockSource;

/// Chain id of Ethereum mainnet
pub const MAINNET_CHAIN_ID: u64 = 1;

/// How far behind the network head a node may be and still count as synced
pub const SYNC_TOLERANCE_BLOCKS: u64 = 20;

/// Default per-request node timeout
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

const NOT_SYNCED_WARNING: &str = "You are using an ethereum node but we could not verify that \
    it is synchronized in the ethereum mainnet. Balances and other queries may be incorrect.";

/// Builds provider handles for an endpoint
#[async_trait::async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(&self, endpoint: &str, timeout: Duration) -> Result<Arc<dyn EthereumProvider>>;
}

/// Connector producing Alloy HTTP providers
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

#[async_trait::async_trait]
impl NodeConnector for HttpConnector {
    async fn connect(&self, endpoint: &str, timeout: Duration) -> Result<Arc<dyn EthereumProvider>> {
        let provider = create_provider(ProviderConfig::Http {
            url: endpoint.to_string(),
            timeout,
        })?;
        Ok(Arc::from(provider))
    }
}

/// Whether a connected node passed the sync-lag check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncHealth {
    /// Within tolerance of the reference height, or not verified at all
    Synchronized,
    /// The reference height could not be determined
    Degraded,
}

/// Connectivity state
#[derive(Clone)]
pub enum NodeState {
    Disconnected,
    Connected {
        provider: Arc<dyn EthereumProvider>,
        health: SyncHealth,
    },
}

impl std::fmt::Debug for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Disconnected => f.write_str("Disconnected"),
            NodeState::Connected { provider, health } => f
                .debug_struct("Connected")
                .field("endpoint", &provider.endpoint_name())
                .field("health", health)
                .finish(),
        }
    }
}

/// Result of a connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub connected: bool,
    /// Human readable detail; empty on a fresh successful connection
    pub message: String,
}

impl ConnectOutcome {
    fn success(message: impl Into<String>) -> Self {
        Self {
            connected: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            message: message.into(),
        }
    }
}

/// Validate that a node at `current_block` is within tolerance of `latest_block`
pub fn is_synchronized(current_block: u64, latest_block: u64) -> (bool, String) {
    if current_block < latest_block.saturating_sub(SYNC_TOLERANCE_BLOCKS) {
        let message = format!(
            "Found ethereum node but it is out of sync. {} / {}. Will use etherscan.",
            current_block, latest_block
        );
        warn!("{}", message);
        return (false, message);
    }
    (true, String::new())
}

/// Prepend `http://` when the endpoint has no scheme
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    match Url::parse(trimmed) {
        // "localhost:8545" parses with "localhost" as the scheme; require a
        // host so that form is still treated as scheme-less.
        Ok(url) if url.has_host() => trimmed.to_string(),
        _ => format!("http://{}", trimmed),
    }
}

/// Connection to a single node endpoint
pub struct NodeConnection {
    endpoint: String,
    state: NodeState,
    timeout: Duration,
    connector: Arc<dyn NodeConnector>,
    highest_block: Arc<dyn HighestBlockSource>,
    messages: Arc<dyn MessagesAggregator>,
}

impl NodeConnection {
    /// Create a disconnected node connection for `endpoint`
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        connector: Arc<dyn NodeConnector>,
        highest_block: Arc<dyn HighestBlockSource>,
        messages: Arc<dyn MessagesAggregator>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: NodeState::Disconnected,
            timeout,
            connector,
            highest_block,
            messages,
        }
    }

    /// The last endpoint successfully connected to (or the initial one)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, NodeState::Connected { .. })
    }

    /// The provider handle, if connected
    pub fn provider(&self) -> Option<Arc<dyn EthereumProvider>> {
        match &self.state {
            NodeState::Connected { provider, .. } => Some(Arc::clone(provider)),
            NodeState::Disconnected => None,
        }
    }

    /// Try to connect to `endpoint`
    ///
    /// Never fails: every problem ends in [`NodeState::Disconnected`] and a
    /// `connected: false` outcome carrying the reason.
    pub async fn attempt_connect(&mut self, endpoint: &str, verify_mainnet: bool) -> ConnectOutcome {
        if self.endpoint == endpoint && self.is_connected() {
            return ConnectOutcome::success("Already connected to an ethereum node");
        }

        // Release the old handle before building a new one
        self.state = NodeState::Disconnected;

        let uri = normalize_endpoint(endpoint);
        let provider = match self.establish(&uri).await {
            Ok(provider) => provider,
            Err(err) => {
                warn!(
                    endpoint = %uri,
                    error = %format!("{:#}", err),
                    "Could not connect to an ethereum node. Will use etherscan only"
                );
                return ConnectOutcome::failure(format!(
                    "Failed to connect to ethereum node at endpoint {}",
                    uri
                ));
            }
        };

        let health = if verify_mainnet {
            match self.verify(&uri, provider.as_ref()).await {
                Ok(health) => health,
                Err(message) => return ConnectOutcome::failure(message),
            }
        } else {
            SyncHealth::Synchronized
        };

        self.endpoint = endpoint.to_string();
        self.state = NodeState::Connected { provider, health };
        info!(endpoint = %uri, ?health, "Connected to ethereum node");
        ConnectOutcome::success("")
    }

    async fn establish(&self, uri: &str) -> Result<Arc<dyn EthereumProvider>> {
        let provider = self.connector.connect(uri, self.timeout).await?;
        let version = provider.client_version().await?;
        debug!(endpoint = %uri, client_version = %version, "Ethereum node reachable");
        Ok(provider)
    }

    /// Mainnet identity and sync-lag checks
    async fn verify(&self, uri: &str, provider: &dyn EthereumProvider) -> Result<SyncHealth, String> {
        let chain_id = provider.chain_id().await.map_err(|err| {
            verification_failure(uri, "chain id", &err)
        })?;
        if chain_id != MAINNET_CHAIN_ID {
            let message = format!(
                "Connected to ethereum node at endpoint {} but it is not on the ethereum \
                 mainnet. The chain id the node is in is {}.",
                uri, chain_id
            );
            warn!("{}", message);
            return Err(message);
        }

        let sync = provider
            .sync_status()
            .await
            .map_err(|err| verification_failure(uri, "sync status", &err))?;

        let (current_block, latest_block) = match sync {
            Some(progress) => (progress.current_block, Some(progress.highest_block)),
            None => {
                let current = provider
                    .block_number()
                    .await
                    .map_err(|err| verification_failure(uri, "block number", &err))?;
                (current, self.highest_block.query_highest_block().await)
            }
        };

        let Some(latest_block) = latest_block else {
            warn!("Could not query latest block");
            self.messages.add_warning(NOT_SYNCED_WARNING.to_string());
            return Ok(SyncHealth::Degraded);
        };

        let (synchronized, message) = is_synchronized(current_block, latest_block);
        if !synchronized {
            self.messages.add_warning(message.clone());
            return Err(message);
        }
        Ok(SyncHealth::Synchronized)
    }
}

fn verification_failure(uri: &str, what: &str, err: &anyhow::Error) -> String {
    let message = format!(
        "Failed to query {} from ethereum node at endpoint {}: {:#}",
        what, uri, err
    );
    warn!("{}", message);
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use alloy::primitives::{Address, Bytes, U256};
    use alloy::rpc::types::{Block, Log, TransactionRequest};

    use crate::core::MessageQueue;
    use crate::domain::{LogFilter, SyncProgress};

    #[derive(Clone)]
    struct FakeNode {
        chain_id: u64,
        syncing: Option<SyncProgress>,
        head: u64,
        reachable: bool,
        head_fails: bool,
    }

    impl FakeNode {
        fn mainnet(head: u64) -> Self {
            Self {
                chain_id: 1,
                syncing: None,
                head,
                reachable: true,
                head_fails: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl EthereumProvider for FakeNode {
        async fn client_version(&self) -> Result<String> {
            if self.reachable {
                Ok("Geth/v1.13.0".to_string())
            } else {
                anyhow::bail!("connection refused")
            }
        }
        async fn chain_id(&self) -> Result<u64> {
            Ok(self.chain_id)
        }
        async fn sync_status(&self) -> Result<Option<SyncProgress>> {
            Ok(self.syncing)
        }
        async fn block_number(&self) -> Result<u64> {
            if self.head_fails {
                anyhow::bail!("header not found")
            }
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
        async fn get_logs(&self, _filter: &LogFilter) -> Result<Vec<Log>> {
            Ok(Vec::new())
        }
        async fn get_block(&self, _number: u64) -> Result<Option<Block>> {
            Ok(None)
        }
        fn endpoint_name(&self) -> String {
            "fake".to_string()
        }
    }

    struct FakeConnector {
        node: FakeNode,
        connects: AtomicUsize,
        last_uri: Mutex<Option<String>>,
    }

    impl FakeConnector {
        fn new(node: FakeNode) -> Arc<Self> {
            Arc::new(Self {
                node,
                connects: AtomicUsize::new(0),
                last_uri: Mutex::new(None),
            })
        }
    }

    #[async_trait::async_trait]
    impl NodeConnector for FakeConnector {
        async fn connect(&self, endpoint: &str, _timeout: Duration) -> Result<Arc<dyn EthereumProvider>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            *self.last_uri.lock().unwrap() = Some(endpoint.to_string());
            Ok(Arc::new(self.node.clone()))
        }
    }

    struct FixedHeight(Option<u64>);

    #[async_trait::async_trait]
    impl HighestBlockSource for FixedHeight {
        async fn query_highest_block(&self) -> Option<u64> {
            self.0
        }
    }

    fn connection(
        connector: Arc<FakeConnector>,
        highest: Option<u64>,
        messages: Arc<MessageQueue>,
    ) -> NodeConnection {
        NodeConnection::new(
            "http://localhost:8545",
            DEFAULT_RPC_TIMEOUT,
            connector,
            Arc::new(FixedHeight(highest)),
            messages,
        )
    }

    #[test]
    fn test_is_synchronized_boundaries() {
        assert_eq!(is_synchronized(100, 115), (true, String::new()));
        assert!(is_synchronized(100, 120).0);

        let (ok, message) = is_synchronized(100, 121);
        assert!(!ok);
        assert!(message.contains("100 / 121"));

        let (ok, message) = is_synchronized(100, 130);
        assert!(!ok);
        assert!(!message.is_empty());
    }

    #[test]
    fn test_is_synchronized_low_heights() {
        // latest below the tolerance window must not underflow
        assert!(is_synchronized(0, 5).0);
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("localhost:8545"), "http://localhost:8545");
        assert_eq!(normalize_endpoint("127.0.0.1:8545"), "http://127.0.0.1:8545");
        assert_eq!(
            normalize_endpoint("https://mainnet.example.org"),
            "https://mainnet.example.org"
        );
    }

    #[tokio::test]
    async fn test_connect_success() {
        let connector = FakeConnector::new(FakeNode::mainnet(1_000));
        let messages = Arc::new(MessageQueue::new());
        let mut node = connection(connector.clone(), Some(1_010), messages.clone());

        let outcome = node.attempt_connect("localhost:8545", true).await;

        assert_eq!(outcome, ConnectOutcome::success(""));
        assert!(node.is_connected());
        assert_eq!(node.endpoint(), "localhost:8545");
        assert_eq!(
            connector.last_uri.lock().unwrap().as_deref(),
            Some("http://localhost:8545")
        );
        assert!(messages.consume_warnings().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_same_endpoint_is_noop() {
        let connector = FakeConnector::new(FakeNode::mainnet(1_000));
        let mut node = connection(connector.clone(), Some(1_000), Arc::new(MessageQueue::new()));

        assert!(node.attempt_connect("http://node:8545", true).await.connected);
        let again = node.attempt_connect("http://node:8545", true).await;

        assert!(again.connected);
        assert_eq!(again.message, "Already connected to an ethereum node");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_chain_id_disconnects() {
        let mut fake = FakeNode::mainnet(1_000);
        fake.chain_id = 5;
        // Sync status must not matter
        fake.syncing = Some(SyncProgress {
            current_block: 1_000,
            highest_block: 1_000,
        });
        let mut node = connection(FakeConnector::new(fake), Some(1_000), Arc::new(MessageQueue::new()));

        let outcome = node.attempt_connect("http://node:8545", true).await;

        assert!(!outcome.connected);
        assert!(outcome.message.contains("The chain id the node is in is 5"));
        assert!(!node.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let mut fake = FakeNode::mainnet(1_000);
        fake.reachable = false;
        let mut node = connection(FakeConnector::new(fake), Some(1_000), Arc::new(MessageQueue::new()));

        let outcome = node.attempt_connect("node:8545", true).await;

        assert!(!outcome.connected);
        assert_eq!(
            outcome.message,
            "Failed to connect to ethereum node at endpoint http://node:8545"
        );
        assert!(matches!(node.state(), NodeState::Disconnected));
    }

    #[tokio::test]
    async fn test_rpc_error_during_verification_disconnects() {
        let mut fake = FakeNode::mainnet(1_000);
        fake.head_fails = true;
        let mut node = connection(FakeConnector::new(fake), Some(1_000), Arc::new(MessageQueue::new()));

        let outcome = node.attempt_connect("http://node:8545", true).await;

        assert!(!outcome.connected);
        assert!(outcome.message.contains("Failed to query block number"));
        assert!(outcome.message.contains("header not found"));
        assert!(!node.is_connected());
        assert!(node.provider().is_none());
    }

    #[tokio::test]
    async fn test_out_of_sync_node_disconnects() {
        let connector = FakeConnector::new(FakeNode::mainnet(1_000));
        let messages = Arc::new(MessageQueue::new());
        let mut node = connection(connector, Some(1_100), messages.clone());

        let outcome = node.attempt_connect("http://node:8545", true).await;

        assert!(!outcome.connected);
        assert!(outcome.message.contains("out of sync"));
        assert!(!node.is_connected());
        assert_eq!(messages.consume_warnings(), vec![outcome.message]);
    }

    #[tokio::test]
    async fn test_syncing_node_uses_reported_heights() {
        let mut fake = FakeNode::mainnet(0);
        fake.syncing = Some(SyncProgress {
            current_block: 500,
            highest_block: 900,
        });
        // The oracle would say the node is fine; the node's own report wins
        let mut node = connection(FakeConnector::new(fake), Some(500), Arc::new(MessageQueue::new()));

        let outcome = node.attempt_connect("http://node:8545", true).await;

        assert!(!outcome.connected);
        assert!(outcome.message.contains("500 / 900"));
    }

    #[tokio::test]
    async fn test_unknown_reference_height_connects_degraded() {
        let messages = Arc::new(MessageQueue::new());
        let mut node = connection(
            FakeConnector::new(FakeNode::mainnet(1_000)),
            None,
            messages.clone(),
        );

        let outcome = node.attempt_connect("http://node:8545", true).await;

        assert!(outcome.connected);
        assert!(matches!(
            node.state(),
            NodeState::Connected {
                health: SyncHealth::Degraded,
                ..
            }
        ));
        assert_eq!(messages.consume_warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_skip_mainnet_check() {
        let mut fake = FakeNode::mainnet(1_000);
        fake.chain_id = 31337;
        let mut node = connection(FakeConnector::new(fake), None, Arc::new(MessageQueue::new()));

        let outcome = node.attempt_connect("http://anvil:8545", false).await;

        assert!(outcome.connected);
        assert!(node.is_connected());
    }

    #[tokio::test]
    async fn test_failed_reconnect_releases_previous_handle() {
        let connector = FakeConnector::new(FakeNode::mainnet(1_000));
        let mut node = connection(connector, Some(1_000), Arc::new(MessageQueue::new()));
        assert!(node.attempt_connect("http://a:8545", true).await.connected);

        let mut bad = FakeNode::mainnet(1_000);
        bad.chain_id = 10;
        node.connector = FakeConnector::new(bad);
        let outcome = node.attempt_connect("http://b:8545", true).await;

        assert!(!outcome.connected);
        assert!(node.provider().is_none());
        assert_eq!(node.endpoint(), "http://a:8545");
    }
}
