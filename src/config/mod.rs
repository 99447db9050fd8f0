use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::{Asset, StaticAssetResolver, TokenDescriptor};

pub const DEFAULT_RPC_ENDPOINT: &str = "http://localhost:8545";
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSpec {
    pub address: String,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExplorerConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetSpec {
    pub identifier: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_rpc_endpoint")]
    pub rpc_endpoint: String,

    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub mainnet_check: bool,

    #[serde(default)]
    pub explorer: ExplorerConfig,

    pub highest_block_url: Option<String>,

    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub tokens: Vec<TokenSpec>,

    #[serde(default)]
    pub assets: Vec<AssetSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_endpoint: default_rpc_endpoint(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            mainnet_check: true,
            explorer: ExplorerConfig::default(),
            highest_block_url: None,
            database_path: None,
            tokens: Vec::new(),
            assets: Vec::new(),
        }
    }
}

fn default_rpc_endpoint() -> String {
    DEFAULT_RPC_ENDPOINT.to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    DEFAULT_RPC_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

impl TokenSpec {
    pub fn display_symbol(&self) -> String {
        self.symbol
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| short_addr(&self.address))
    }

    /// Tokens without explicit decimals are assumed to use 18
    pub fn descriptor(&self) -> Result<TokenDescriptor> {
        let address: Address = self
            .address
            .trim()
            .parse()
            .with_context(|| format!("invalid token address {}", self.address))?;
        Ok(TokenDescriptor::new(
            address,
            self.decimals.unwrap_or(18),
            self.display_symbol(),
        ))
    }
}

impl Config {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs.max(1))
    }

    /// Look up a configured token by symbol (case-insensitive) or address
    pub fn find_token(&self, needle: &str) -> Result<Option<TokenDescriptor>> {
        let needle = needle.trim();
        for spec in &self.tokens {
            let by_symbol = spec
                .symbol
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(needle));
            let by_address = spec.address.trim().eq_ignore_ascii_case(needle);
            if by_symbol || by_address {
                return spec.descriptor().map(Some);
            }
        }
        Ok(None)
    }

    pub fn asset_resolver(&self) -> StaticAssetResolver {
        StaticAssetResolver::new(
            self.assets
                .iter()
                .map(|spec| Asset::new(spec.identifier.clone(), spec.symbol.clone())),
        )
    }

    pub fn ledger_db_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(|| data_dir().map(|dir| dir.join("ledger.sqlite3")))
    }
}

pub fn load() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(_) => return Config::default(),
    };
    parse(&content).unwrap_or_default()
}

pub fn parse(content: &str) -> Result<Config> {
    toml::from_str::<Config>(content).context("invalid config file")
}

pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("ETHGATE_CONFIG").map(PathBuf::from) {
        return Some(path);
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return Some(xdg.join("ethgate").join("config.toml"));
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        return Some(home.join(".config").join("ethgate").join("config.toml"));
    }

    directories::ProjectDirs::from("io", "ethgate", "ethgate")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn data_dir() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").map(PathBuf::from) {
        return Some(xdg.join("ethgate"));
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        return Some(home.join(".local").join("share").join("ethgate"));
    }
    directories::ProjectDirs::from("io", "ethgate", "ethgate")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

fn short_addr(value: &str) -> String {
    let value = value.trim();
    if value.len() <= 10 {
        return value.to_string();
    }
    let start: String = value.chars().take(6).collect();
    let end: String = value
        .chars()
        .rev()
        .take(4)
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    format!("{}..{}", start, end)
}
