//! Domain models
//!
//! Plain data shared by the infrastructure adapters and the chain accessor,
//! independent of any transport.

pub mod chain;
pub mod ledger;
pub mod units;

pub use chain::{BalanceMap, BlockTag, LogFilter, LogQuery, SyncProgress, TokenDescriptor};
pub use ledger::{
    Asset, AssetResolver, LedgerAction, LedgerActionFilter, LedgerActionType, Location,
    StaticAssetResolver,
};
pub use units::{from_wei, scale_amount, ETHER_DECIMALS};
