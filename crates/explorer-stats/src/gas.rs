//! Gas profiling over block windows.
//!
//! These walk the window one block at a time because attribution needs the
//! receipt of every transaction. Calls are grouped by 4-byte selector, so
//! identical selectors on different contracts are lumped together.

use std::collections::HashMap;

use alloy::primitives::{Address, B256, U256};
use explorer_data::fetcher::latest_window;
use explorer_data::{BatchFetcher, Block, ChainReader, Receipt, Transaction};
use serde::{Deserialize, Serialize};

use crate::network::log_failures;
use crate::ratio_percent;

/// Selector used for calldata shorter than 4 bytes (plain value transfers).
pub const FALLBACK_SELECTOR: &str = "0x00000000";

/// Aggregate gas usage for one function selector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionGasStats {
    pub selector: String,
    pub call_count: u64,
    pub total_gas: U256,
    pub average_gas: U256,
    pub min_gas: u64,
    pub max_gas: u64,
    /// Share of the window's gas, in percent.
    pub share_percent: f64,
}

/// Gas usage over a window, attributed per selector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GasStatistics {
    pub start_block: u64,
    pub end_block: u64,
    pub block_count: u64,
    /// Transactions with a receipt available.
    pub transaction_count: u64,
    pub total_gas_used: U256,
    /// Sum of `gas_used * effective_gas_price` in Wei.
    pub total_fees_paid: U256,
    pub average_gas_per_transaction: U256,
    pub average_gas_price: U256,
    pub failed_transactions: u64,
    pub failed_gas_used: U256,
    /// Mean of `gas_used / gas_limit` across blocks, in percent.
    pub average_utilization_percent: f64,
    /// Sorted by total gas, descending.
    pub functions: Vec<FunctionGasStats>,
}

/// Gas usage for one contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GasConsumer {
    pub address: Address,
    pub total_gas: U256,
    pub transaction_count: u64,
    pub average_gas: U256,
    pub share_percent: f64,
}

/// One sampled block of a gas trend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GasTrendPoint {
    pub block_number: u64,
    pub timestamp: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub utilization_percent: f64,
    pub base_fee_per_gas: Option<u128>,
    pub transaction_count: u64,
    /// Mean effective gas price of the block's transactions.
    pub average_gas_price: U256,
}

/// First 4 bytes of calldata as `0x`-prefixed hex, or [`FALLBACK_SELECTOR`].
pub fn extract_selector(input: &[u8]) -> String {
    match input.get(..4) {
        Some(selector) => format!("0x{}", alloy::hex::encode(selector)),
        None => FALLBACK_SELECTOR.to_string(),
    }
}

#[derive(Default)]
struct SelectorTotals {
    calls: u64,
    total_gas: U256,
    min_gas: u64,
    max_gas: u64,
}

impl SelectorTotals {
    fn record(&mut self, gas_used: u64) {
        if self.calls == 0 || gas_used < self.min_gas {
            self.min_gas = gas_used;
        }
        self.max_gas = self.max_gas.max(gas_used);
        self.calls += 1;
        self.total_gas += U256::from(gas_used);
    }
}

/// Per-selector gas attribution over the newest `count` blocks.
#[tracing::instrument(skip(fetcher))]
pub async fn get_gas_statistics<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    count: u64,
) -> GasStatistics {
    let Some((start_block, end_block)) = window(fetcher, count).await else {
        return GasStatistics::default();
    };

    let mut stats = GasStatistics {
        start_block,
        end_block,
        ..GasStatistics::default()
    };
    let mut by_selector: HashMap<String, SelectorTotals> = HashMap::new();
    let mut utilization_sum = 0.0;

    for number in start_block..=end_block {
        let Some((block, pairs)) = block_with_receipts(fetcher, number).await else {
            continue;
        };
        stats.block_count += 1;
        utilization_sum += ratio_percent(U256::from(block.gas_used), U256::from(block.gas_limit));

        for (tx, receipt) in pairs {
            let gas_used = U256::from(receipt.gas_used);
            stats.transaction_count += 1;
            stats.total_gas_used += gas_used;
            stats.total_fees_paid += gas_used * U256::from(receipt.effective_gas_price);
            if !receipt.succeeded() {
                stats.failed_transactions += 1;
                stats.failed_gas_used += gas_used;
            }

            by_selector
                .entry(extract_selector(&tx.input))
                .or_default()
                .record(receipt.gas_used);
        }
    }

    if stats.transaction_count > 0 {
        let count = U256::from(stats.transaction_count);
        stats.average_gas_per_transaction = stats.total_gas_used / count;
    }
    if !stats.total_gas_used.is_zero() {
        stats.average_gas_price = stats.total_fees_paid / stats.total_gas_used;
    }
    if stats.block_count > 0 {
        stats.average_utilization_percent = utilization_sum / stats.block_count as f64;
    }

    let total_gas = stats.total_gas_used;
    stats.functions = by_selector
        .into_iter()
        .map(|(selector, totals)| FunctionGasStats {
            selector,
            call_count: totals.calls,
            average_gas: totals.total_gas / U256::from(totals.calls.max(1)),
            total_gas: totals.total_gas,
            min_gas: totals.min_gas,
            max_gas: totals.max_gas,
            share_percent: ratio_percent(totals.total_gas, total_gas),
        })
        .collect();
    stats
        .functions
        .sort_by(|a, b| b.total_gas.cmp(&a.total_gas).then_with(|| a.selector.cmp(&b.selector)));

    stats
}

/// Contracts ranked by gas consumed over the newest `count` blocks, truncated to `limit`.
///
/// Contract creations are attributed to the deployed address.
#[tracing::instrument(skip(fetcher))]
pub async fn get_top_gas_consumers<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    count: u64,
    limit: usize,
) -> Vec<GasConsumer> {
    let Some((start_block, end_block)) = window(fetcher, count).await else {
        return Vec::new();
    };

    let mut by_contract: HashMap<Address, (U256, u64)> = HashMap::new();
    let mut window_gas = U256::ZERO;

    for number in start_block..=end_block {
        let Some((_, pairs)) = block_with_receipts(fetcher, number).await else {
            continue;
        };
        for (tx, receipt) in pairs {
            let Some(contract) = tx.to.or(receipt.contract_address) else {
                continue;
            };
            let gas_used = U256::from(receipt.gas_used);
            window_gas += gas_used;
            let entry = by_contract.entry(contract).or_insert((U256::ZERO, 0));
            entry.0 += gas_used;
            entry.1 += 1;
        }
    }

    let mut consumers: Vec<GasConsumer> = by_contract
        .into_iter()
        .map(|(address, (total_gas, transaction_count))| GasConsumer {
            address,
            total_gas,
            transaction_count,
            average_gas: total_gas / U256::from(transaction_count.max(1)),
            share_percent: ratio_percent(total_gas, window_gas),
        })
        .collect();
    consumers.sort_by(|a, b| b.total_gas.cmp(&a.total_gas).then_with(|| a.address.cmp(&b.address)));
    consumers.truncate(limit);
    consumers
}

/// Samples `sample_size` evenly spaced blocks of the newest `count` blocks.
///
/// The spacing is `floor(window / sample_size)` (at least 1), starting at the
/// oldest block of the window.
#[tracing::instrument(skip(fetcher))]
pub async fn get_gas_trends<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    count: u64,
    sample_size: u64,
) -> Vec<GasTrendPoint> {
    let Some((start_block, end_block)) = window(fetcher, count).await else {
        return Vec::new();
    };

    let mut points = Vec::new();
    for number in sample_block_numbers(start_block, end_block, sample_size) {
        let Some((block, pairs)) = block_with_receipts(fetcher, number).await else {
            continue;
        };

        let fees: U256 = pairs
            .iter()
            .map(|(_, r)| U256::from(r.gas_used) * U256::from(r.effective_gas_price))
            .sum();
        let gas: U256 = pairs.iter().map(|(_, r)| U256::from(r.gas_used)).sum();
        let average_gas_price = if gas.is_zero() { U256::ZERO } else { fees / gas };

        points.push(GasTrendPoint {
            block_number: block.number,
            timestamp: block.timestamp,
            gas_used: block.gas_used,
            gas_limit: block.gas_limit,
            utilization_percent: ratio_percent(
                U256::from(block.gas_used),
                U256::from(block.gas_limit),
            ),
            base_fee_per_gas: block.base_fee_per_gas,
            transaction_count: block.transaction_count() as u64,
            average_gas_price,
        });
    }

    points
}

/// Evenly spaced block numbers in `[start, end]`, at most `sample_size` of them.
pub fn sample_block_numbers(start: u64, end: u64, sample_size: u64) -> Vec<u64> {
    if sample_size == 0 || start > end {
        return Vec::new();
    }
    let block_range = end - start + 1;
    let interval = (block_range / sample_size).max(1);

    (0..sample_size)
        .map(|i| start + i * interval)
        .take_while(|number| *number <= end)
        .collect()
}

async fn window<R: ChainReader>(fetcher: &BatchFetcher<R>, count: u64) -> Option<(u64, u64)> {
    match fetcher.latest_block_number().await {
        Ok(latest) => latest_window(latest, count),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read chain head");
            None
        }
    }
}

/// Block with full transactions paired with their receipts, in block order.
///
/// Transactions whose receipt is unavailable are left out.
async fn block_with_receipts<R: ChainReader>(
    fetcher: &BatchFetcher<R>,
    number: u64,
) -> Option<(Block, Vec<(Transaction, Receipt)>)> {
    let block = match fetcher.block(number, true).await {
        Ok(Some(block)) => block,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(block_number = number, error = %e, "block fetch failed");
            return None;
        }
    };

    let hashes = block.transactions.hashes();
    let receipts = fetcher
        .fetch_receipts_batched(&hashes, fetcher.receipt_options())
        .await;
    log_failures("receipts", &receipts);

    let mut by_hash: HashMap<B256, Receipt> = receipts
        .into_items()
        .into_iter()
        .map(|receipt| (receipt.transaction_hash, receipt))
        .collect();

    let pairs = block
        .transactions
        .full()
        .iter()
        .filter_map(|tx| by_hash.remove(&tx.hash).map(|receipt| (tx.clone(), receipt)))
        .collect();

    Some((block, pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_from_calldata() {
        assert_eq!(
            extract_selector(&[0xa9, 0x05, 0x9c, 0xbb, 0x00, 0x01]),
            "0xa9059cbb"
        );
        assert_eq!(extract_selector(&[]), FALLBACK_SELECTOR);
        assert_eq!(extract_selector(&[0xa9, 0x05, 0x9c]), FALLBACK_SELECTOR);
    }

    #[test]
    fn samples_are_evenly_spaced() {
        assert_eq!(sample_block_numbers(100, 199, 4), vec![100, 125, 150, 175]);
        assert_eq!(sample_block_numbers(0, 2, 10), vec![0, 1, 2]);
        assert!(sample_block_numbers(10, 5, 3).is_empty());
        assert!(sample_block_numbers(0, 10, 0).is_empty());
    }

    #[test]
    fn selector_totals_track_min_and_max() {
        let mut totals = SelectorTotals::default();
        totals.record(50_000);
        totals.record(21_000);
        totals.record(90_000);
        assert_eq!(totals.calls, 3);
        assert_eq!(totals.min_gas, 21_000);
        assert_eq!(totals.max_gas, 90_000);
        assert_eq!(totals.total_gas, U256::from(161_000u64));
    }
}
