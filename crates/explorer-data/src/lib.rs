//! explorer-data crate
//!
//! Chain access, bounded caches, batched range fetching and head polling for
//! a local development node.

pub mod cache;
pub mod chain;
pub mod fetcher;
pub mod head;
pub mod types;
pub mod watch;

pub use chain::{ChainReader, LogFilter, RpcChainReader};
pub use fetcher::{BatchFetcher, BlockRangeOptions, FetchFailure, Fetched, ReceiptBatchOptions};
pub use head::{HeadPoller, HeadWatch};
pub use types::{Block, BlockTransactions, EnrichedTransaction, Log, Receipt, ReceiptStatus, Transaction};
pub use watch::WatchHandle;
