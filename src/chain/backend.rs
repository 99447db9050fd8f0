//! Node and explorer implementations of the chain read operations

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::rpc::types::{Log, TransactionRequest};
use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Function;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::chain::scan::scan_logs;
use crate::domain::{from_wei, scale_amount, BalanceMap, LogQuery, TokenDescriptor};
use crate::error::ChainError;
use crate::infrastructure::abi::{
    decode_hex_data, decode_single_output, encode_call, find_function, token_abi,
};
use crate::infrastructure::ethereum::EthereumProvider;
use crate::infrastructure::explorer::RemoteExplorer;

/// Read operations available on either a node or the block explorer
#[async_trait::async_trait]
pub trait ChainBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Native balance in ether
    async fn get_balance(&self, address: Address) -> Result<Decimal, ChainError>;

    async fn get_balances(&self, addresses: &[Address]) -> Result<BalanceMap, ChainError>;

    async fn get_token_balance(
        &self,
        token: &TokenDescriptor,
        owner: Address,
    ) -> Result<Decimal, ChainError>;

    /// 0x-prefixed bytecode
    async fn get_code(&self, address: Address) -> Result<String, ChainError>;

    async fn call_contract_method(
        &self,
        contract: Address,
        function: &Function,
        arguments: &[DynSolValue],
    ) -> Result<DynSolValue, ChainError>;

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, ChainError>;
}

fn balance_of() -> Result<&'static Function, ChainError> {
    Ok(find_function(token_abi()?, "balanceOf", 1)?)
}

fn token_amount(
    function: &Function,
    value: &DynSolValue,
    token: &TokenDescriptor,
) -> Result<Decimal, ChainError> {
    let (raw, _) = value.as_uint().ok_or_else(|| ChainError::UnexpectedOutput {
        method: function.name.clone(),
        message: format!("expected an unsigned integer for {}", token.symbol),
    })?;
    Ok(scale_amount(raw, token.decimals)?)
}

/// Reads through a connected node
pub struct NodeBackend {
    provider: Arc<dyn EthereumProvider>,
}

impl NodeBackend {
    pub fn new(provider: Arc<dyn EthereumProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl ChainBackend for NodeBackend {
    fn name(&self) -> &'static str {
        "node"
    }

    async fn get_balance(&self, address: Address) -> Result<Decimal, ChainError> {
        let wei = self
            .provider
            .get_balance(address)
            .await
            .map_err(ChainError::node)?;
        debug!(%address, %wei, "Node balance");
        Ok(from_wei(wei)?)
    }

    async fn get_balances(&self, addresses: &[Address]) -> Result<BalanceMap, ChainError> {
        let mut balances = BalanceMap::with_capacity(addresses.len());
        for address in addresses {
            balances.insert(*address, self.get_balance(*address).await?);
        }
        Ok(balances)
    }

    async fn get_token_balance(
        &self,
        token: &TokenDescriptor,
        owner: Address,
    ) -> Result<Decimal, ChainError> {
        let function = balance_of()?;
        let value = self
            .call_contract_method(token.address, function, &[DynSolValue::Address(owner)])
            .await?;
        token_amount(function, &value, token)
    }

    async fn get_code(&self, address: Address) -> Result<String, ChainError> {
        let code = self
            .provider
            .get_code(address)
            .await
            .map_err(ChainError::node)?;
        Ok(code.to_string())
    }

    async fn call_contract_method(
        &self,
        contract: Address,
        function: &Function,
        arguments: &[DynSolValue],
    ) -> Result<DynSolValue, ChainError> {
        let data = encode_call(function, arguments)?;
        let request = TransactionRequest::default().to(contract).input(data.into());
        let output = self.provider.call(request).await.map_err(ChainError::node)?;
        debug!(%contract, method = %function.name, bytes = output.len(), "Node eth_call");
        Ok(decode_single_output(function, &output)?)
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, ChainError> {
        scan_logs(self.provider.as_ref(), query).await
    }
}

/// Reads through the block explorer
pub struct ExplorerBackend {
    explorer: Arc<dyn RemoteExplorer>,
}

impl ExplorerBackend {
    pub fn new(explorer: Arc<dyn RemoteExplorer>) -> Self {
        Self { explorer }
    }
}

#[async_trait::async_trait]
impl ChainBackend for ExplorerBackend {
    fn name(&self) -> &'static str {
        "etherscan"
    }

    async fn get_balance(&self, address: Address) -> Result<Decimal, ChainError> {
        let wei = self.explorer.get_account_balance(address).await?;
        debug!(%address, %wei, "Etherscan balance");
        Ok(from_wei(wei)?)
    }

    async fn get_balances(&self, addresses: &[Address]) -> Result<BalanceMap, ChainError> {
        let raw = self.explorer.get_accounts_balance(addresses).await?;

        let mut balances = BalanceMap::with_capacity(raw.len());
        for address in addresses {
            match raw.get(address) {
                Some(wei) => {
                    balances.insert(*address, from_wei(*wei)?);
                }
                None => warn!(%address, "Etherscan did not return a balance for account"),
            }
        }
        Ok(balances)
    }

    async fn get_token_balance(
        &self,
        token: &TokenDescriptor,
        owner: Address,
    ) -> Result<Decimal, ChainError> {
        let raw = self.explorer.get_token_balance(token.address, owner).await?;
        Ok(scale_amount(raw, token.decimals)?)
    }

    async fn get_code(&self, address: Address) -> Result<String, ChainError> {
        Ok(self.explorer.get_code(address).await?)
    }

    async fn call_contract_method(
        &self,
        contract: Address,
        function: &Function,
        arguments: &[DynSolValue],
    ) -> Result<DynSolValue, ChainError> {
        let data = encode_call(function, arguments)?;
        let result = self.explorer.eth_call(contract, &data).await?;
        debug!(%contract, method = %function.name, "Etherscan eth_call");
        let output = decode_hex_data(&result)?;
        Ok(decode_single_output(function, &output)?)
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, ChainError> {
        warn!(
            event = %query.event_name,
            "Log queries are not supported through etherscan, returning no logs"
        );
        Ok(Vec::new())
    }
}
