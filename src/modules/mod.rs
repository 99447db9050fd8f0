//! Feature modules built on top of the chain and storage layers

pub mod gitcoin;
