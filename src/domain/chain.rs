//! Chain-side domain types: tokens, balances, log queries

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use alloy::primitives::{Address, B256};
use alloy_json_abi::JsonAbi;
use rust_decimal::Decimal;

/// Address -> decimal amount, produced fresh for every query
pub type BalanceMap = HashMap<Address, Decimal>;

/// An ERC-20 style token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

impl TokenDescriptor {
    pub fn new(address: Address, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            address,
            decimals,
            symbol: symbol.into(),
        }
    }
}

/// Upper bound of a block range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Number(u64),
    /// Resolved to the node's head when the query runs
    Latest,
}

impl std::str::FromStr for BlockTag {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("latest") {
            Ok(BlockTag::Latest)
        } else {
            s.trim().parse::<u64>().map(BlockTag::Number)
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Number(n) => write!(f, "{}", n),
            BlockTag::Latest => write!(f, "latest"),
        }
    }
}

/// An event log query against a single contract
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub contract_address: Address,
    pub abi: JsonAbi,
    pub event_name: String,
    /// Indexed argument name -> value, in the argument's textual form
    pub argument_filters: BTreeMap<String, String>,
    pub from_block: u64,
    pub to_block: BlockTag,
}

impl LogQuery {
    pub fn new(contract_address: Address, abi: JsonAbi, event_name: impl Into<String>) -> Self {
        Self {
            contract_address,
            abi,
            event_name: event_name.into(),
            argument_filters: BTreeMap::new(),
            from_block: 0,
            to_block: BlockTag::Latest,
        }
    }

    pub fn with_filter(mut self, argument: impl Into<String>, value: impl Into<String>) -> Self {
        self.argument_filters.insert(argument.into(), value.into());
        self
    }

    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = block;
        self
    }

    pub fn to_block(mut self, block: BlockTag) -> Self {
        self.to_block = block;
        self
    }
}

/// A single `eth_getLogs` request over a closed block range
///
/// `topics[i] == None` is a wildcard for that position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topics: Vec<Option<B256>>,
    pub from_block: u64,
    pub to_block: u64,
}

/// Node-reported sync progress (`eth_syncing` while it is catching up)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    pub current_block: u64,
    pub highest_block: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_tag_parse() {
        assert_eq!("latest".parse::<BlockTag>().unwrap(), BlockTag::Latest);
        assert_eq!("LATEST".parse::<BlockTag>().unwrap(), BlockTag::Latest);
        assert_eq!("12345".parse::<BlockTag>().unwrap(), BlockTag::Number(12345));
        assert!("soon".parse::<BlockTag>().is_err());
    }

    #[test]
    fn test_log_query_builder() {
        let query = LogQuery::new(Address::ZERO, JsonAbi::new(), "Transfer")
            .with_filter("from", "0x0000000000000000000000000000000000000001")
            .from_block(100)
            .to_block(BlockTag::Number(200));

        assert_eq!(query.event_name, "Transfer");
        assert_eq!(query.argument_filters.len(), 1);
        assert_eq!(query.from_block, 100);
        assert_eq!(query.to_block, BlockTag::Number(200));
    }
}
