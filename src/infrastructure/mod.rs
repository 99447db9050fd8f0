//! Infrastructure layer - External service integrations
//!
//! This layer contains:
//! - Alloy-based Ethereum provider and node connection state
//! - ABI encoding and decoding using alloy-dyn-abi
//! - Block explorer and block height HTTP clients

pub mod abi;
pub mod ethereum;
pub mod explorer;
