//! Ledger domain: assets and ledger actions

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

/// A known asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Asset {
    /// Stable identifier (e.g. "ETH", or a token's checksummed address)
    pub identifier: String,
    pub symbol: String,
}

impl Asset {
    pub fn new(identifier: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            symbol: symbol.into(),
        }
    }

    /// The rate asset every imported donation is priced in
    pub fn usd() -> Self {
        Self::new("USD", "USD")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerActionType {
    Income,
    Expense,
    Loss,
    DonationReceived,
    Airdrop,
    Gift,
    Grant,
}

impl LedgerActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerActionType::Income => "income",
            LedgerActionType::Expense => "expense",
            LedgerActionType::Loss => "loss",
            LedgerActionType::DonationReceived => "donation received",
            LedgerActionType::Airdrop => "airdrop",
            LedgerActionType::Gift => "gift",
            LedgerActionType::Grant => "grant",
        }
    }
}

impl FromStr for LedgerActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(LedgerActionType::Income),
            "expense" => Ok(LedgerActionType::Expense),
            "loss" => Ok(LedgerActionType::Loss),
            "donation received" => Ok(LedgerActionType::DonationReceived),
            "airdrop" => Ok(LedgerActionType::Airdrop),
            "gift" => Ok(LedgerActionType::Gift),
            "grant" => Ok(LedgerActionType::Grant),
            other => Err(format!("unknown ledger action type '{}'", other)),
        }
    }
}

impl fmt::Display for LedgerActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a ledger action happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Blockchain,
    External,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Blockchain => "blockchain",
            Location::External => "external",
        }
    }
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blockchain" => Ok(Location::Blockchain),
            "external" => Ok(Location::External),
            other => Err(format!("unknown location '{}'", other)),
        }
    }
}

/// A single ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAction {
    /// Assigned by the store; meaningless before insertion
    pub identifier: i64,
    /// Unix seconds
    pub timestamp: i64,
    pub action_type: LedgerActionType,
    pub location: Location,
    pub amount: Decimal,
    pub asset: Asset,
    pub rate: Option<Decimal>,
    pub rate_asset: Option<Asset>,
    /// External reference, e.g. a transaction hash. Identity for dedup.
    pub link: Option<String>,
    pub notes: Option<String>,
}

/// Selection criteria for stored ledger actions. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerActionFilter {
    pub from_ts: Option<i64>,
    pub to_ts: Option<i64>,
    pub location: Option<Location>,
    pub notes: Option<String>,
}

/// Maps a CSV/UI symbol to a single known asset
pub trait AssetResolver: Send + Sync {
    fn asset_by_symbol(&self, symbol: &str) -> Option<Asset>;
}

/// Asset resolver over a fixed symbol table
///
/// A symbol shared by more than one asset is ambiguous and does not resolve.
#[derive(Debug, Default, Clone)]
pub struct StaticAssetResolver {
    by_symbol: HashMap<String, Vec<Asset>>,
}

impl StaticAssetResolver {
    pub fn new(assets: impl IntoIterator<Item = Asset>) -> Self {
        let mut by_symbol: HashMap<String, Vec<Asset>> = HashMap::new();
        for asset in assets {
            by_symbol
                .entry(asset.symbol.to_uppercase())
                .or_default()
                .push(asset);
        }
        Self { by_symbol }
    }
}

impl AssetResolver for StaticAssetResolver {
    fn asset_by_symbol(&self, symbol: &str) -> Option<Asset> {
        match self.by_symbol.get(&symbol.trim().to_uppercase()) {
            Some(candidates) if candidates.len() == 1 => candidates.first().cloned(),
            _ => None,
        }
    }
}
