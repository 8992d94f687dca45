//! Throughput and activity statistics over block windows.

use std::collections::HashSet;

use alloy::primitives::{Address, U256};
use explorer_data::fetcher::latest_window;
use explorer_data::{BatchFetcher, Block, ChainReader, Fetched};
use futures::future::join;
use serde::{Deserialize, Serialize};

/// Transaction count and value moved over a window.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionVolume {
    pub start_block: u64,
    pub end_block: u64,
    /// Blocks that were actually fetched.
    pub block_count: u64,
    pub transaction_count: u64,
    /// Sum of transferred value in Wei.
    pub total_value: U256,
    /// `total_value / transaction_count`, integer division.
    pub average_value: U256,
    pub average_transactions_per_block: f64,
    pub contract_creations: u64,
}

/// Distinct addresses seen over a window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAddresses {
    pub start_block: u64,
    pub end_block: u64,
    /// Size of the union of senders and receivers.
    pub total_active: u64,
    pub unique_senders: u64,
    pub unique_receivers: u64,
}

/// Dashboard summary of the chain head.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub latest_block: u64,
    pub latest_timestamp: u64,
    pub average_block_time: f64,
    pub tps: f64,
    pub base_fee_per_gas: Option<u128>,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub gas_utilization_percent: f64,
    /// Number of blocks the averages were computed over.
    pub window: u64,
}

/// Transactions per second between `start_block` and `end_block`.
///
/// Returns 0 for inverted ranges, zero time spans, and missing boundary blocks.
#[tracing::instrument(skip(fetcher))]
pub async fn calculate_tps<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    start_block: u64,
    end_block: u64,
) -> f64 {
    if start_block > end_block {
        return 0.0;
    }

    let (first, last) = join(
        fetcher.block(start_block, false),
        fetcher.block(end_block, false),
    )
    .await;
    let (first, last) = match (first, last) {
        (Ok(Some(first)), Ok(Some(last))) => (first, last),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "failed to fetch TPS boundary blocks");
            return 0.0;
        }
        _ => return 0.0,
    };

    let time_diff = last.timestamp.saturating_sub(first.timestamp);
    if time_diff == 0 {
        return 0.0;
    }

    let blocks = fetcher
        .fetch_blocks_batched(start_block, end_block, fetcher.block_options())
        .await;
    log_failures("tps", &blocks);

    let total_txs: u64 = blocks
        .items()
        .iter()
        .map(|block| block.transaction_count() as u64)
        .sum();

    total_txs as f64 / time_diff as f64
}

/// Mean seconds between consecutive blocks over the newest `count` blocks.
///
/// `count` is clamped to the blocks that exist. Fewer than two blocks yields 0.
#[tracing::instrument(skip(fetcher))]
pub async fn calculate_average_block_time<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    count: u64,
) -> f64 {
    let latest = match fetcher.latest_block_number().await {
        Ok(latest) => latest,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read chain head");
            return 0.0;
        }
    };
    if count < 1 || latest < 1 {
        return 0.0;
    }

    let Some((first_number, last_number)) = latest_window(latest, count) else {
        return 0.0;
    };
    let span = last_number - first_number;
    if span == 0 {
        return 0.0;
    }

    let (first, last) = join(
        fetcher.block(first_number, false),
        fetcher.block(last_number, false),
    )
    .await;
    match (first, last) {
        (Ok(Some(first)), Ok(Some(last))) => {
            last.timestamp.saturating_sub(first.timestamp) as f64 / span as f64
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "failed to fetch block time boundary blocks");
            0.0
        }
        _ => 0.0,
    }
}

/// Transaction count and total value over the newest `count` blocks.
#[tracing::instrument(skip(fetcher))]
pub async fn get_transaction_volume<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    count: u64,
) -> TransactionVolume {
    let Some((start_block, end_block, blocks)) = fetch_latest_window(fetcher, count).await else {
        return TransactionVolume::default();
    };

    let mut volume = TransactionVolume {
        start_block,
        end_block,
        block_count: blocks.len() as u64,
        ..TransactionVolume::default()
    };

    for tx in blocks.iter().flat_map(|block| block.transactions.full()) {
        volume.transaction_count += 1;
        volume.total_value = volume.total_value.saturating_add(tx.value);
        if tx.is_contract_creation() {
            volume.contract_creations += 1;
        }
    }

    if volume.transaction_count > 0 {
        volume.average_value = volume.total_value / U256::from(volume.transaction_count);
    }
    if volume.block_count > 0 {
        volume.average_transactions_per_block =
            volume.transaction_count as f64 / volume.block_count as f64;
    }

    volume
}

/// Unique senders, receivers and their union over the newest `count` blocks.
///
/// Contract creations contribute a sender but no receiver.
#[tracing::instrument(skip(fetcher))]
pub async fn get_active_addresses<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    count: u64,
) -> ActiveAddresses {
    let Some((start_block, end_block, blocks)) = fetch_latest_window(fetcher, count).await else {
        return ActiveAddresses::default();
    };

    let mut senders: HashSet<Address> = HashSet::new();
    let mut receivers: HashSet<Address> = HashSet::new();
    for tx in blocks.iter().flat_map(|block| block.transactions.full()) {
        senders.insert(tx.from);
        if let Some(to) = tx.to {
            receivers.insert(to);
        }
    }

    ActiveAddresses {
        start_block,
        end_block,
        total_active: senders.union(&receivers).count() as u64,
        unique_senders: senders.len() as u64,
        unique_receivers: receivers.len() as u64,
    }
}

/// Head summary with averages over the newest `window` blocks.
#[tracing::instrument(skip(fetcher))]
pub async fn get_network_stats<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    window: u64,
) -> NetworkStats {
    let latest = match fetcher.latest_block_number().await {
        Ok(latest) => latest,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read chain head");
            return NetworkStats::default();
        }
    };

    let head = match fetcher.block(latest, false).await {
        Ok(Some(block)) => block,
        Ok(None) => return NetworkStats::default(),
        Err(e) => {
            tracing::warn!(error = %e, block_number = latest, "failed to fetch head block");
            return NetworkStats::default();
        }
    };

    let (start, end) = latest_window(latest, window).unwrap_or((latest, latest));
    let average_block_time = calculate_average_block_time(fetcher, window).await;
    let tps = calculate_tps(fetcher, start, end).await;

    NetworkStats {
        latest_block: latest,
        latest_timestamp: head.timestamp,
        average_block_time,
        tps,
        base_fee_per_gas: head.base_fee_per_gas,
        gas_used: head.gas_used,
        gas_limit: head.gas_limit,
        gas_utilization_percent: crate::ratio_percent(
            U256::from(head.gas_used),
            U256::from(head.gas_limit),
        ),
        window: end - start + 1,
    }
}

/// Fetches the newest `count` blocks with transaction bodies.
async fn fetch_latest_window<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    count: u64,
) -> Option<(u64, u64, Vec<Block>)> {
    let latest = match fetcher.latest_block_number().await {
        Ok(latest) => latest,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read chain head");
            return None;
        }
    };
    let (start, end) = latest_window(latest, count)?;

    let blocks = fetcher
        .fetch_blocks_batched(start, end, fetcher.block_options().with_transactions())
        .await;
    log_failures("window", &blocks);

    Some((start, end, blocks.into_items()))
}

pub(crate) fn log_failures<T>(context: &str, fetched: &Fetched<T>) {
    let failures = fetched.failures();
    if !failures.is_empty() {
        tracing::warn!(
            context,
            failed = failures.len(),
            errors = failures.iter().filter(|f| f.is_error()).count(),
            "window aggregated with missing blocks"
        );
    }
}
