//! Integration tests for the explorer context and its query layer.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{addr, sample_receipt, sample_tx, FakeChain};
use explorer_events::{MemoryStorage, RawDecoder, SilentNotifier, Storage};
use explorer_query::{Explorer, ExplorerConfig};

fn config() -> ExplorerConfig {
    ExplorerConfig {
        polling_interval: Duration::from_secs(1),
        // Long enough that only head invalidation refreshes latest views.
        latest_stale_time: Duration::from_secs(3600),
        stats_stale_time: Duration::from_secs(3600),
        ..ExplorerConfig::default()
    }
}

fn explorer(chain: &Arc<FakeChain>, config: ExplorerConfig) -> Explorer<FakeChain> {
    explorer_with_storage(chain, config, Arc::new(MemoryStorage::new()))
}

fn explorer_with_storage(
    chain: &Arc<FakeChain>,
    config: ExplorerConfig,
    storage: Arc<dyn Storage>,
) -> Explorer<FakeChain> {
    Explorer::new(
        Arc::clone(chain),
        config,
        storage,
        Arc::new(RawDecoder),
        Arc::new(SilentNotifier),
    )
    .expect("explorer should build")
}

#[tokio::test]
async fn identical_queries_share_one_fetch() {
    let chain = Arc::new(FakeChain::new(50));
    let explorer = explorer(&chain, config());

    let (a, b) = tokio::join!(
        explorer.latest_blocks(10, false),
        explorer.latest_blocks(10, false)
    );

    assert_eq!(a.expect("first"), b.expect("second"));
    assert_eq!(chain.number_calls(), 1);
    assert_eq!(chain.block_calls(), 10);
}

#[tokio::test]
async fn missing_block_is_not_remembered() {
    let chain = Arc::new(FakeChain::new(5));
    let explorer = explorer(&chain, config());

    assert!(explorer.block(6, false).await.expect("query").is_none());
    chain.set_head(6);
    let block = explorer
        .block(6, false)
        .await
        .expect("query")
        .expect("block mined");
    assert_eq!(block.number, 6);

    explorer.block(6, false).await.expect("query");
    assert_eq!(chain.block_calls(), 2);
}

#[tokio::test]
async fn malformed_hash_is_an_error() {
    let chain = Arc::new(FakeChain::new(5));
    let explorer = explorer(&chain, config());

    assert!(explorer.receipt("0xzz").await.is_err());
    assert!(explorer.transaction("").await.is_err());
    assert_eq!(chain.receipt_calls(), 0);
}

#[tokio::test]
async fn receipts_and_transactions_by_hash() {
    let chain = Arc::new(FakeChain::new(5));
    let tx = sample_tx(9, addr(0xa), Some(addr(0xb)), 3, &[]);
    chain.add_transaction(4, tx.clone(), sample_receipt(&tx, 21_000, true));
    let explorer = explorer(&chain, config());
    let hash = tx.hash.to_string().to_uppercase().replacen("0X", "0x", 1);

    let receipt = explorer
        .receipt(&hash)
        .await
        .expect("query")
        .expect("receipt known");
    assert_eq!(receipt.block_number, Some(4));
    let found = explorer
        .transaction(&hash)
        .await
        .expect("query")
        .expect("transaction known");
    assert_eq!(found, tx);

    explorer.receipt(&hash).await.expect("query");
    assert_eq!(chain.receipt_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn new_head_refreshes_latest_views() {
    let chain = Arc::new(FakeChain::new(20));
    let explorer = explorer(&chain, config());
    let _follow = explorer.follow_head();

    let before = explorer.latest_blocks(3, false).await.expect("query");
    assert_eq!(before[0].number, 20);
    let block = explorer.block(20, false).await.expect("query");
    assert!(block.is_some());

    chain.set_head(21);
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let after = explorer.latest_blocks(3, false).await.expect("query");
    assert_eq!(after[0].number, 21);

    // Historical blocks stay cached across heads.
    let calls = chain.block_calls();
    assert!(explorer.block(20, false).await.expect("query").is_some());
    assert_eq!(chain.block_calls(), calls);
}

#[tokio::test]
async fn point_lookups_stay_within_cache_capacity() {
    let chain = Arc::new(FakeChain::new(1_499));
    let explorer = explorer(
        &chain,
        ExplorerConfig {
            block_cache_capacity: 100,
            ..config()
        },
    );

    for number in 0..1_500 {
        explorer.block(number, false).await.expect("query");
    }

    assert_eq!(explorer.queries().len(), 0);
    assert_eq!(explorer.fetcher().block_cache().size(), 100);

    // Block 0 was evicted, so asking again goes back to the node.
    let calls = chain.block_calls();
    assert!(explorer.block(0, false).await.expect("query").is_some());
    assert_eq!(chain.block_calls(), calls + 1);
}

#[tokio::test]
async fn failed_queries_leave_no_slots() {
    let chain = Arc::new(FakeChain::new(5));
    chain.set_head_unavailable(true);
    let explorer = explorer(&chain, config());

    assert!(explorer.latest_blocks(3, false).await.is_err());
    assert!(explorer.latest_transactions(3, 10).await.is_err());

    assert!(explorer.queries().is_empty());
}

#[tokio::test]
async fn stats_queries_are_cached() {
    let chain = Arc::new(FakeChain::new(30));
    let explorer = explorer(&chain, config());

    let first = explorer.network_stats(10).await.expect("query");
    let calls = chain.number_calls();
    let second = explorer.network_stats(10).await.expect("query");

    assert_eq!(first, second);
    assert_eq!(chain.number_calls(), calls);
    assert_eq!(first.latest_block, 30);
}

#[tokio::test]
async fn max_stored_events_seeds_settings_once() {
    let chain = Arc::new(FakeChain::new(1));
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());

    let first = explorer_with_storage(
        &chain,
        ExplorerConfig {
            max_stored_events: 5,
            ..config()
        },
        Arc::clone(&storage),
    );
    assert_eq!(first.events().settings().expect("settings").max_events, 5);

    let second = explorer_with_storage(
        &chain,
        ExplorerConfig {
            max_stored_events: 50,
            ..config()
        },
        storage,
    );
    assert_eq!(second.events().settings().expect("settings").max_events, 5);
}

#[tokio::test]
async fn shutdown_stops_background_work() {
    let chain = Arc::new(FakeChain::new(1));
    let explorer = explorer(&chain, config());
    let _heads = explorer.head().subscribe();
    explorer
        .events()
        .subscribe(Default::default())
        .expect("subscribe");

    explorer.shutdown();

    assert!(!explorer.head().is_running());
    assert_eq!(explorer.events().active_watch_count(), 0);
}
