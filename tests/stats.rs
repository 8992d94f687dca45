//! Integration tests for the aggregation layer.

mod common;

use std::sync::Arc;

use alloy::primitives::U256;
use common::{addr, sample_receipt, sample_tx, FakeChain, BLOCK_TIME};
use explorer_data::BatchFetcher;
use explorer_stats::{
    calculate_average_block_time, calculate_tps, get_active_addresses, get_gas_statistics,
    get_gas_trends, get_network_stats, get_top_gas_consumers, get_transaction_volume,
    ActiveAddresses, TransactionVolume, FALLBACK_SELECTOR,
};

const TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
const APPROVE: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

fn fetcher(chain: FakeChain) -> (Arc<FakeChain>, BatchFetcher<FakeChain>) {
    let chain = Arc::new(chain);
    let fetcher = BatchFetcher::new(Arc::clone(&chain));
    (chain, fetcher)
}

#[tokio::test]
async fn tps_over_zero_time_span_is_zero() {
    let (_, fetcher) = fetcher(FakeChain::new(10));

    let tps = calculate_tps(&fetcher, 5, 5).await;

    assert_eq!(tps, 0.0);
    assert!(tps.is_finite());
}

#[tokio::test]
async fn tps_over_inverted_range_is_zero() {
    let (chain, fetcher) = fetcher(FakeChain::new(10));

    assert_eq!(calculate_tps(&fetcher, 8, 2).await, 0.0);
    assert_eq!(chain.block_calls(), 0);
}

#[tokio::test]
async fn tps_divides_transactions_by_elapsed_time() {
    let chain = FakeChain::new(20);
    for seed in 1..=3 {
        let tx = sample_tx(seed, addr(0xa), Some(addr(0xb)), 1, &[]);
        chain.add_transaction(11, tx.clone(), sample_receipt(&tx, 21_000, true));
    }
    let tx = sample_tx(4, addr(0xa), Some(addr(0xb)), 1, &[]);
    chain.add_transaction(12, tx.clone(), sample_receipt(&tx, 21_000, true));
    let (_, fetcher) = fetcher(chain);

    // Ten blocks two seconds apart: four transactions over twenty seconds.
    let tps = calculate_tps(&fetcher, 10, 20).await;

    assert!((tps - 0.2).abs() < 1e-9, "tps was {tps}");
}

#[tokio::test]
async fn average_block_time_clamps_to_chain_height() {
    let (_, fetcher) = fetcher(FakeChain::new(5));

    let clamped = calculate_average_block_time(&fetcher, 50).await;
    let exact = calculate_average_block_time(&fetcher, 6).await;

    assert_eq!(clamped, exact);
    assert_eq!(clamped, BLOCK_TIME as f64);
}

#[tokio::test]
async fn average_block_time_guards_tiny_windows() {
    let (_, fetcher) = fetcher(FakeChain::new(5));
    assert_eq!(calculate_average_block_time(&fetcher, 0).await, 0.0);
    assert_eq!(calculate_average_block_time(&fetcher, 1).await, 0.0);

    let (_, genesis_only) = self::fetcher(FakeChain::new(0));
    assert_eq!(calculate_average_block_time(&genesis_only, 10).await, 0.0);
}

/// A→B, B→C, A→C: three active addresses, two senders, two receivers.
#[tokio::test]
async fn active_addresses_count_senders_receivers_and_union() {
    let chain = FakeChain::new(60);
    let (a, b, c) = (addr(0xa), addr(0xb), addr(0xc));
    for (seed, (from, to)) in [(a, b), (b, c), (a, c)].into_iter().enumerate() {
        let tx = sample_tx(seed as u64 + 1, from, Some(to), 1, &[]);
        chain.add_transaction(55 + seed as u64, tx.clone(), sample_receipt(&tx, 21_000, true));
    }
    let (_, fetcher) = fetcher(chain);

    let active = get_active_addresses(&fetcher, 50).await;

    assert_eq!(active.total_active, 3);
    assert_eq!(active.unique_senders, 2);
    assert_eq!(active.unique_receivers, 2);
    assert_eq!((active.start_block, active.end_block), (11, 60));
}

#[tokio::test]
async fn transaction_volume_sums_values() {
    let chain = FakeChain::new(20);
    for (seed, value) in [(1u64, 1u64), (2, 2), (3, 3)] {
        let tx = sample_tx(seed, addr(0xa), Some(addr(0xb)), value, &[]);
        chain.add_transaction(18, tx.clone(), sample_receipt(&tx, 21_000, true));
    }
    let deploy = sample_tx(4, addr(0xa), None, 0, &[0x60, 0x80, 0x60, 0x40]);
    chain.add_transaction(19, deploy.clone(), sample_receipt(&deploy, 90_000, true));
    let (_, fetcher) = fetcher(chain);

    let volume = get_transaction_volume(&fetcher, 10).await;

    assert_eq!(volume.block_count, 10);
    assert_eq!(volume.transaction_count, 4);
    assert_eq!(volume.total_value, U256::from(6u64));
    assert_eq!(volume.average_value, U256::from(1u64));
    assert_eq!(volume.contract_creations, 1);
    assert!((volume.average_transactions_per_block - 0.4).abs() < 1e-9);
}

#[tokio::test]
async fn aggregations_zero_out_when_node_is_down() {
    let chain = FakeChain::new(20);
    chain.set_head_unavailable(true);
    let (_, fetcher) = fetcher(chain);

    assert_eq!(get_transaction_volume(&fetcher, 10).await, TransactionVolume::default());
    assert_eq!(get_active_addresses(&fetcher, 10).await, ActiveAddresses::default());
    assert_eq!(calculate_average_block_time(&fetcher, 10).await, 0.0);
    assert!(get_gas_trends(&fetcher, 10, 5).await.is_empty());
}

fn gas_chain() -> FakeChain {
    let chain = FakeChain::new(10);
    let token = addr(0x70);

    let transfer = sample_tx(1, addr(0xa), Some(token), 0, &[&TRANSFER[..], &[0u8; 64][..]].concat());
    chain.add_transaction(9, transfer.clone(), sample_receipt(&transfer, 50_000, true));

    let reverted = sample_tx(2, addr(0xa), Some(token), 0, &TRANSFER);
    chain.add_transaction(9, reverted.clone(), sample_receipt(&reverted, 30_000, false));

    let send = sample_tx(3, addr(0xa), Some(addr(0xb)), 1_000, &[]);
    chain.add_transaction(9, send.clone(), sample_receipt(&send, 21_000, true));

    let approve = sample_tx(4, addr(0xb), Some(token), 0, &APPROVE);
    chain.add_transaction(10, approve.clone(), sample_receipt(&approve, 45_000, true));

    let deploy = sample_tx(5, addr(0xb), None, 0, &[0x60, 0x80]);
    let mut deploy_receipt = sample_receipt(&deploy, 60_000, true);
    deploy_receipt.contract_address = Some(addr(0xcc));
    chain.add_transaction(10, deploy, deploy_receipt);

    chain
}

#[tokio::test]
async fn gas_statistics_attribute_by_selector() {
    let (_, fetcher) = fetcher(gas_chain());

    let stats = get_gas_statistics(&fetcher, 10).await;

    assert_eq!((stats.start_block, stats.end_block), (1, 10));
    assert_eq!(stats.block_count, 10);
    assert_eq!(stats.transaction_count, 5);
    assert_eq!(stats.total_gas_used, U256::from(206_000u64));
    assert_eq!(stats.failed_transactions, 1);
    assert_eq!(stats.failed_gas_used, U256::from(30_000u64));
    assert_eq!(stats.average_gas_price, U256::from(2_000_000_000u64));
    assert_eq!(
        stats.total_fees_paid,
        U256::from(206_000u64) * U256::from(2_000_000_000u64)
    );

    // Plain sends and short deploy calldata share the fallback selector.
    let selectors: Vec<&str> = stats.functions.iter().map(|f| f.selector.as_str()).collect();
    assert_eq!(selectors, vec![FALLBACK_SELECTOR, "0xa9059cbb", "0x095ea7b3"]);

    let transfer = &stats.functions[1];
    assert_eq!(transfer.call_count, 2);
    assert_eq!(transfer.total_gas, U256::from(80_000u64));
    assert_eq!(transfer.min_gas, 30_000);
    assert_eq!(transfer.max_gas, 50_000);
}

#[tokio::test]
async fn top_consumers_rank_contracts_and_deployments() {
    let (_, fetcher) = fetcher(gas_chain());

    let consumers = get_top_gas_consumers(&fetcher, 10, 10).await;

    let ranked: Vec<_> = consumers.iter().map(|c| (c.address, c.transaction_count)).collect();
    assert_eq!(ranked, vec![(addr(0x70), 3), (addr(0xcc), 1), (addr(0xb), 1)]);
    assert_eq!(consumers[0].total_gas, U256::from(125_000u64));

    let top = get_top_gas_consumers(&fetcher, 10, 1).await;
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].address, addr(0x70));
}

#[tokio::test]
async fn gas_trends_sample_evenly() {
    let chain = FakeChain::new(99);
    let tx = sample_tx(1, addr(0xa), Some(addr(0xb)), 1, &[]);
    chain.add_transaction(50, tx.clone(), sample_receipt(&tx, 21_000, true));
    let (_, fetcher) = fetcher(chain);

    let points = get_gas_trends(&fetcher, 100, 4).await;

    let sampled: Vec<u64> = points.iter().map(|p| p.block_number).collect();
    assert_eq!(sampled, vec![0, 25, 50, 75]);
    assert_eq!(points[2].transaction_count, 1);
    assert_eq!(points[2].gas_used, 21_000);
    assert_eq!(points[2].average_gas_price, U256::from(2_000_000_000u64));
    assert_eq!(points[0].average_gas_price, U256::ZERO);
}

#[tokio::test]
async fn network_stats_summarise_head() {
    let (_, fetcher) = fetcher(gas_chain());

    let stats = get_network_stats(&fetcher, 5).await;

    assert_eq!(stats.latest_block, 10);
    assert_eq!(stats.window, 5);
    assert_eq!(stats.average_block_time, BLOCK_TIME as f64);
    assert_eq!(stats.gas_used, 105_000);
    assert_eq!(stats.base_fee_per_gas, Some(1_000_000_000));
    // Five transactions across blocks 6..=10, eight seconds apart.
    assert!((stats.tps - 5.0 / 8.0).abs() < 1e-9, "tps was {}", stats.tps);
}
