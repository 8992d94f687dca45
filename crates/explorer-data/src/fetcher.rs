//! Cache-aware batched fetching of blocks and receipts.
//!
//! Ranges are split into contiguous sub-ranges of at most `batch_size`
//! items. Every request of a sub-range is issued at once and the whole
//! sub-range settles before the next one starts, so at most `batch_size`
//! requests are in flight. Per-item failures never abort the range; they are
//! reported alongside the items that did arrive.

use std::sync::Arc;

use alloy::primitives::B256;
use eyre::{eyre, Context, Result};
use futures::future::join_all;

use crate::cache::{
    BlockCache, BlockKey, ReceiptCache, TransactionCache, DEFAULT_BLOCK_CACHE_CAPACITY,
    DEFAULT_RECEIPT_CACHE_CAPACITY,
};
use crate::chain::ChainReader;
use crate::types::{Block, BlockTransactions, EnrichedTransaction, Receipt, Transaction};

/// Default number of concurrent block requests per sub-range.
pub const DEFAULT_BLOCK_BATCH_SIZE: usize = 10;
/// Default number of concurrent receipt requests per batch.
pub const DEFAULT_RECEIPT_BATCH_SIZE: usize = 20;

/// Options for [`BatchFetcher::fetch_blocks_batched`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRangeOptions {
    pub include_transactions: bool,
    pub batch_size: usize,
    pub use_cache: bool,
}

impl Default for BlockRangeOptions {
    fn default() -> Self {
        Self {
            include_transactions: false,
            batch_size: DEFAULT_BLOCK_BATCH_SIZE,
            use_cache: true,
        }
    }
}

impl BlockRangeOptions {
    pub fn with_transactions(mut self) -> Self {
        self.include_transactions = true;
        self
    }
}

/// Options for [`BatchFetcher::fetch_receipts_batched`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiptBatchOptions {
    pub batch_size: usize,
    pub use_cache: bool,
}

impl Default for ReceiptBatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_RECEIPT_BATCH_SIZE,
            use_cache: true,
        }
    }
}

/// Why a single item of a batch is absent from the output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchFailure {
    /// The node answered but has no such object.
    Missing { key: String },
    /// The request failed.
    Error { key: String, message: String },
}

impl FetchFailure {
    pub fn key(&self) -> &str {
        match self {
            Self::Missing { key } | Self::Error { key, .. } => key,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Outcome of a batched fetch.
///
/// Distinguishes a genuinely empty result from one where every request
/// failed, which a bare `Vec` cannot.
#[derive(Clone, Debug, PartialEq)]
pub enum Fetched<T> {
    /// Every requested item arrived (possibly zero items requested).
    Complete(Vec<T>),
    /// Some items arrived, some did not.
    Partial {
        items: Vec<T>,
        failures: Vec<FetchFailure>,
    },
    /// Items were requested and none arrived.
    Failed(Vec<FetchFailure>),
}

impl<T> Fetched<T> {
    fn from_parts(items: Vec<T>, failures: Vec<FetchFailure>) -> Self {
        match (items.is_empty(), failures.is_empty()) {
            (_, true) => Self::Complete(items),
            (true, false) => Self::Failed(failures),
            (false, false) => Self::Partial { items, failures },
        }
    }

    /// Items that arrived, in request order.
    pub fn items(&self) -> &[T] {
        match self {
            Self::Complete(items) | Self::Partial { items, .. } => items,
            Self::Failed(_) => &[],
        }
    }

    /// Best-effort view: drops failure information.
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Complete(items) | Self::Partial { items, .. } => items,
            Self::Failed(_) => Vec::new(),
        }
    }

    pub fn failures(&self) -> &[FetchFailure] {
        match self {
            Self::Complete(_) => &[],
            Self::Partial { failures, .. } | Self::Failed(failures) => failures,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Reorders the items in place; failures are untouched.
    pub fn sort_items_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> std::cmp::Ordering,
    {
        match self {
            Self::Complete(items) | Self::Partial { items, .. } => items.sort_by(compare),
            Self::Failed(_) => {}
        }
    }
}

/// Returns the inclusive window of the newest `count` blocks below `latest`.
///
/// `count` is clamped to the number of blocks that exist (`latest + 1`).
/// Returns `None` when `count` is zero.
pub fn latest_window(latest: u64, count: u64) -> Option<(u64, u64)> {
    let count = count.min(latest.saturating_add(1));
    if count == 0 {
        return None;
    }
    Some((latest - (count - 1), latest))
}

/// Parses a `0x`-prefixed transaction hash, case-insensitively.
///
/// # Errors
/// Returns error if the string is not a 32-byte hex value.
pub fn parse_tx_hash(hash: &str) -> Result<B256> {
    hash.trim()
        .parse::<B256>()
        .map_err(|e| eyre!("malformed transaction hash {hash:?}: {e}"))
}

/// Turns ranges and hash lists into cache-aware, concurrency-limited fetches.
pub struct BatchFetcher<R> {
    reader: Arc<R>,
    blocks: Arc<BlockCache>,
    receipts: Arc<ReceiptCache>,
    transactions: Arc<TransactionCache>,
    block_batch_size: usize,
    receipt_batch_size: usize,
}

impl<R: ChainReader> BatchFetcher<R> {
    /// Creates a fetcher with default cache capacities (1000 blocks, 500 receipts).
    pub fn new(reader: Arc<R>) -> Self {
        Self::with_capacities(
            reader,
            DEFAULT_BLOCK_CACHE_CAPACITY,
            DEFAULT_RECEIPT_CACHE_CAPACITY,
        )
    }

    pub fn with_capacities(reader: Arc<R>, block_capacity: usize, receipt_capacity: usize) -> Self {
        Self {
            reader,
            blocks: Arc::new(BlockCache::new(block_capacity)),
            receipts: Arc::new(ReceiptCache::new(receipt_capacity)),
            transactions: Arc::new(TransactionCache::new(receipt_capacity)),
            block_batch_size: DEFAULT_BLOCK_BATCH_SIZE,
            receipt_batch_size: DEFAULT_RECEIPT_BATCH_SIZE,
        }
    }

    /// Overrides the batch sizes used by [`Self::block_options`] and [`Self::receipt_options`].
    pub fn with_batch_sizes(mut self, block_batch_size: usize, receipt_batch_size: usize) -> Self {
        self.block_batch_size = block_batch_size.max(1);
        self.receipt_batch_size = receipt_batch_size.max(1);
        self
    }

    /// Cached range options with this fetcher's block batch size.
    pub fn block_options(&self) -> BlockRangeOptions {
        BlockRangeOptions {
            batch_size: self.block_batch_size,
            ..BlockRangeOptions::default()
        }
    }

    /// Cached receipt options with this fetcher's receipt batch size.
    pub fn receipt_options(&self) -> ReceiptBatchOptions {
        ReceiptBatchOptions {
            batch_size: self.receipt_batch_size,
            use_cache: true,
        }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    pub fn block_cache(&self) -> &BlockCache {
        &self.blocks
    }

    pub fn receipt_cache(&self) -> &ReceiptCache {
        &self.receipts
    }

    /// Current chain head.
    pub async fn latest_block_number(&self) -> Result<u64> {
        self.reader.get_block_number().await
    }

    /// Fetches one block, serving it from cache when present.
    pub async fn block(&self, number: u64, include_transactions: bool) -> Result<Option<Block>> {
        self.block_with(number, include_transactions, true).await
    }

    async fn block_with(
        &self,
        number: u64,
        include_transactions: bool,
        use_cache: bool,
    ) -> Result<Option<Block>> {
        let key = BlockKey::new(number, include_transactions);
        if use_cache {
            if let Some(block) = self.blocks.get(&key) {
                tracing::trace!(block_number = number, "block cache hit");
                return Ok(Some(block));
            }
        }

        let block = self.reader.get_block(number, include_transactions).await?;

        if use_cache {
            if let Some(block) = &block {
                self.blocks.put(key, block.clone());
                if let BlockTransactions::Full(txs) = &block.transactions {
                    for tx in txs {
                        self.transactions.put(tx.hash, tx.clone());
                    }
                }
            }
        }

        Ok(block)
    }

    /// Fetches one receipt, serving it from cache when present.
    pub async fn receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.receipt_with(hash, true).await
    }

    async fn receipt_with(&self, hash: B256, use_cache: bool) -> Result<Option<Receipt>> {
        if use_cache {
            if let Some(receipt) = self.receipts.get(&hash) {
                return Ok(Some(receipt));
            }
        }

        let receipt = self.reader.get_transaction_receipt(hash).await?;

        if use_cache {
            if let Some(receipt) = &receipt {
                self.receipts.put(hash, receipt.clone());
            }
        }

        Ok(receipt)
    }

    /// Fetches one transaction body, serving it from cache when present.
    pub async fn transaction(&self, hash: B256) -> Result<Option<Transaction>> {
        if let Some(tx) = self.transactions.get(&hash) {
            return Ok(Some(tx));
        }

        let tx = self.reader.get_transaction(hash).await?;
        if let Some(tx) = &tx {
            self.transactions.put(hash, tx.clone());
        }
        Ok(tx)
    }

    /// Fetches every block in `[start, end]` in sub-ranges of `batch_size`.
    ///
    /// Items come back in ascending block order. `start > end` yields an
    /// empty [`Fetched::Complete`].
    #[tracing::instrument(skip(self))]
    pub async fn fetch_blocks_batched(
        &self,
        start: u64,
        end: u64,
        options: BlockRangeOptions,
    ) -> Fetched<Block> {
        if start > end {
            return Fetched::Complete(Vec::new());
        }

        let batch_size = options.batch_size.max(1) as u64;
        let total = (end - start).saturating_add(1);
        let mut items = Vec::with_capacity(total.min(1024) as usize);
        let mut failures = Vec::new();

        let mut batch_start = start;
        loop {
            let batch_end = batch_start.saturating_add(batch_size - 1).min(end);

            let results = join_all((batch_start..=batch_end).map(|number| async move {
                let result = self
                    .block_with(number, options.include_transactions, options.use_cache)
                    .await;
                (number, result)
            }))
            .await;

            for (number, result) in results {
                match result {
                    Ok(Some(block)) => items.push(block),
                    Ok(None) => {
                        tracing::debug!(block_number = number, "block not found");
                        failures.push(FetchFailure::Missing {
                            key: format!("block {number}"),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(block_number = number, error = %e, "block fetch failed");
                        failures.push(FetchFailure::Error {
                            key: format!("block {number}"),
                            message: format!("{e:#}"),
                        });
                    }
                }
            }

            tracing::debug!(batch_start, batch_end, "block batch settled");

            if batch_end == end {
                break;
            }
            batch_start = batch_end + 1;
        }

        Fetched::from_parts(items, failures)
    }

    /// Fetches receipts for `hashes` in batches of `batch_size`, preserving input order.
    ///
    /// Receipts that are not available (not mined yet, request failed) are
    /// reported as failures and not retried.
    #[tracing::instrument(skip_all, fields(count = hashes.len()))]
    pub async fn fetch_receipts_batched(
        &self,
        hashes: &[B256],
        options: ReceiptBatchOptions,
    ) -> Fetched<Receipt> {
        let mut items = Vec::with_capacity(hashes.len());
        let mut failures = Vec::new();

        for chunk in hashes.chunks(options.batch_size.max(1)) {
            let results = join_all(chunk.iter().map(|hash| async move {
                (*hash, self.receipt_with(*hash, options.use_cache).await)
            }))
            .await;

            for (hash, result) in results {
                match result {
                    Ok(Some(receipt)) => items.push(receipt),
                    Ok(None) => failures.push(FetchFailure::Missing {
                        key: format!("receipt {hash}"),
                    }),
                    Err(e) => {
                        tracing::warn!(tx_hash = %hash, error = %e, "receipt fetch failed");
                        failures.push(FetchFailure::Error {
                            key: format!("receipt {hash}"),
                            message: format!("{e:#}"),
                        });
                    }
                }
            }
        }

        Fetched::from_parts(items, failures)
    }

    /// Same as [`Self::fetch_receipts_batched`] for hex hash strings.
    ///
    /// # Errors
    /// Returns error if any hash is malformed; nothing is fetched in that case.
    pub async fn fetch_receipts_by_str<S: AsRef<str>>(
        &self,
        hashes: &[S],
        options: ReceiptBatchOptions,
    ) -> Result<Fetched<Receipt>> {
        let parsed = hashes
            .iter()
            .map(|h| parse_tx_hash(h.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.fetch_receipts_batched(&parsed, options).await)
    }

    /// Newest `count` blocks, newest first.
    ///
    /// # Errors
    /// Returns error only if the chain head cannot be read.
    pub async fn latest_blocks(&self, count: u64, options: BlockRangeOptions) -> Result<Fetched<Block>> {
        let latest = self
            .reader
            .get_block_number()
            .await
            .wrap_err("failed to read chain head")?;

        let Some((start, end)) = latest_window(latest, count) else {
            return Ok(Fetched::Complete(Vec::new()));
        };

        let mut fetched = self.fetch_blocks_batched(start, end, options).await;
        fetched.sort_items_by(|a, b| b.number.cmp(&a.number));
        Ok(fetched)
    }

    /// Up to `limit` most recent transactions across the newest `block_count` blocks.
    ///
    /// # Errors
    /// Returns error only if the chain head cannot be read.
    pub async fn latest_transactions(
        &self,
        block_count: u64,
        limit: usize,
    ) -> Result<Vec<EnrichedTransaction>> {
        let options = self.block_options().with_transactions();
        let blocks = self.latest_blocks(block_count, options).await?.into_items();

        let enriched = blocks
            .iter()
            .flat_map(|block| {
                block
                    .transactions
                    .full()
                    .iter()
                    .rev()
                    .map(move |tx| EnrichedTransaction {
                        transaction: tx.clone(),
                        block_number: block.number,
                        timestamp: block.timestamp,
                    })
            })
            .take(limit)
            .collect();

        Ok(enriched)
    }
}
