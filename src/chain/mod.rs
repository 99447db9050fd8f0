//! Chain access layer
//!
//! [`ChainAccessor`] is the entry point; it routes each read to a node or to
//! the block explorer through the [`ChainBackend`] trait.

mod accessor;
mod backend;
mod scan;

pub use accessor::ChainAccessor;
pub use backend::{ChainBackend, ExplorerBackend, NodeBackend};
pub use scan::{scan_logs, BlockChunks, MAX_BLOCKS_PER_QUERY};
