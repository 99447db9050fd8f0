//! Etherscan-compatible block explorer client
//!
//! Talks to the `module`/`action` query API. Two response shapes come back:
//! the account module wraps results as `{status, message, result}` and the
//! proxy module mirrors JSON-RPC (`{jsonrpc, id, result}` or `{error}`).

use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use serde_json::Value;
use tracing::debug;

use crate::error::RemoteError;

/// Default Etherscan API base URL
pub const DEFAULT_ETHERSCAN_URL: &str = "https://api.etherscan.io/api";

/// Maximum addresses per `balancemulti` request
pub const BALANCEMULTI_BATCH: usize = 20;

const SERVICE: &str = "etherscan";

/// Read-only block explorer operations
#[async_trait::async_trait]
pub trait RemoteExplorer: Send + Sync {
    /// Native balance of one account, in wei
    async fn get_account_balance(&self, address: Address) -> Result<U256, RemoteError>;

    /// Native balances of many accounts, in wei
    ///
    /// Accounts the explorer does not report are absent from the map.
    async fn get_accounts_balance(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, U256>, RemoteError>;

    /// Token balance of `owner` in raw token units
    async fn get_token_balance(&self, token: Address, owner: Address) -> Result<U256, RemoteError>;

    /// Deployed bytecode as a 0x-prefixed hex string
    async fn get_code(&self, address: Address) -> Result<String, RemoteError>;

    /// Raw `eth_call` result as a 0x-prefixed hex string
    async fn eth_call(&self, to: Address, data: &Bytes) -> Result<String, RemoteError>;

    async fn get_latest_block_number(&self) -> Result<u64, RemoteError>;
}

/// HTTP client for an Etherscan-compatible API
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl EtherscanClient {
    /// Create a client against `base_url` (or the public Etherscan API)
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::request(SERVICE, e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_ETHERSCAN_URL.to_string()),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one `module`/`action` query and return the `result` field
    async fn query(
        &self,
        module: &str,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Value, RemoteError> {
        let mut query: Vec<(&str, String)> = vec![
            ("module", module.to_string()),
            ("action", action.to_string()),
        ];
        query.extend(params.iter().cloned());
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }

        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| RemoteError::request(SERVICE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::request(
                SERVICE,
                format!("{} {} returned HTTP {}", module, action, status),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::invalid_response(SERVICE, e.to_string()))?;

        extract_result(module, action, body)
    }
}

/// Unwrap the `result` field, turning either error envelope into `RemoteError::Api`
fn extract_result(module: &str, action: &str, mut body: Value) -> Result<Value, RemoteError> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(RemoteError::api(SERVICE, message));
    }

    if body.get("status").and_then(Value::as_str) == Some("0") {
        // The useful text is usually in `result` ("Max rate limit reached"),
        // `message` is just "NOTOK"
        let message = body
            .get("result")
            .and_then(Value::as_str)
            .or_else(|| body.get("message").and_then(Value::as_str))
            .unwrap_or("unknown error")
            .to_string();
        return Err(RemoteError::api(SERVICE, message));
    }

    match body.get_mut("result") {
        Some(result) => {
            debug!(module, action, "Etherscan query succeeded");
            Ok(result.take())
        }
        None => Err(RemoteError::invalid_response(
            SERVICE,
            format!("{} {} response has no result field", module, action),
        )),
    }
}

fn as_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, RemoteError> {
    value
        .as_str()
        .ok_or_else(|| RemoteError::invalid_response(SERVICE, format!("{} is not a string: {}", what, value)))
}

fn parse_wei(text: &str) -> Result<U256, RemoteError> {
    U256::from_str_radix(text.trim(), 10)
        .map_err(|e| RemoteError::invalid_response(SERVICE, format!("amount '{}': {}", text, e)))
}

fn parse_hex_quantity(text: &str) -> Result<u64, RemoteError> {
    let digits = text.trim().trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .map_err(|e| RemoteError::invalid_response(SERVICE, format!("quantity '{}': {}", text, e)))
}

#[async_trait::async_trait]
impl RemoteExplorer for EtherscanClient {
    async fn get_account_balance(&self, address: Address) -> Result<U256, RemoteError> {
        let result = self
            .query(
                "account",
                "balance",
                &[("address", address.to_string()), ("tag", "latest".to_string())],
            )
            .await?;
        parse_wei(as_str(&result, "balance")?)
    }

    async fn get_accounts_balance(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, U256>, RemoteError> {
        let mut balances = HashMap::with_capacity(addresses.len());

        for chunk in addresses.chunks(BALANCEMULTI_BATCH) {
            let joined = chunk
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let result = self
                .query(
                    "account",
                    "balancemulti",
                    &[("address", joined), ("tag", "latest".to_string())],
                )
                .await?;

            let entries = result.as_array().ok_or_else(|| {
                RemoteError::invalid_response(SERVICE, "balancemulti result is not an array")
            })?;
            for entry in entries {
                let account: Address = as_str(&entry["account"], "account")?
                    .parse()
                    .map_err(|e| RemoteError::invalid_response(SERVICE, format!("account: {}", e)))?;
                let balance = parse_wei(as_str(&entry["balance"], "balance")?)?;
                balances.insert(account, balance);
            }
        }

        Ok(balances)
    }

    async fn get_token_balance(&self, token: Address, owner: Address) -> Result<U256, RemoteError> {
        let result = self
            .query(
                "account",
                "tokenbalance",
                &[
                    ("contractaddress", token.to_string()),
                    ("address", owner.to_string()),
                    ("tag", "latest".to_string()),
                ],
            )
            .await?;
        parse_wei(as_str(&result, "token balance")?)
    }

    async fn get_code(&self, address: Address) -> Result<String, RemoteError> {
        let result = self
            .query(
                "proxy",
                "eth_getCode",
                &[("address", address.to_string()), ("tag", "latest".to_string())],
            )
            .await?;
        Ok(as_str(&result, "code")?.to_string())
    }

    async fn eth_call(&self, to: Address, data: &Bytes) -> Result<String, RemoteError> {
        let result = self
            .query(
                "proxy",
                "eth_call",
                &[
                    ("to", to.to_string()),
                    ("data", data.to_string()),
                    ("tag", "latest".to_string()),
                ],
            )
            .await?;
        Ok(as_str(&result, "call result")?.to_string())
    }

    async fn get_latest_block_number(&self) -> Result<u64, RemoteError> {
        let result = self.query("proxy", "eth_blockNumber", &[]).await?;
        parse_hex_quantity(as_str(&result, "block number")?)
    }
}
