//! The explorer context: one place that wires the chain reader, caches,
//! head poller, query client and subscription manager together.

use std::sync::Arc;

use explorer_data::fetcher::parse_tx_hash;
use explorer_data::{
    BatchFetcher, Block, ChainReader, EnrichedTransaction, HeadPoller, Receipt, RpcChainReader,
    Transaction, WatchHandle,
};
use explorer_events::storage::SETTINGS_KEY;
use explorer_events::{EventSettings, LogDecoder, Notifier, Storage, SubscriptionManager};
use explorer_stats::{
    calculate_average_block_time, calculate_tps, get_active_addresses, get_gas_statistics,
    get_gas_trends, get_network_stats, get_top_gas_consumers, get_transaction_volume,
    ActiveAddresses, GasConsumer, GasStatistics, GasTrendPoint, NetworkStats, TransactionVolume,
};
use eyre::{Context, Result};

use crate::config::ExplorerConfig;
use crate::query::{QueryClient, QueryKey, QueryPolicy};

pub struct Explorer<R> {
    config: ExplorerConfig,
    fetcher: Arc<BatchFetcher<R>>,
    head: Arc<HeadPoller<R>>,
    queries: Arc<QueryClient>,
    events: Arc<SubscriptionManager<R>>,
}

impl Explorer<RpcChainReader> {
    /// Connects to `config.rpc_url` and builds an explorer over it.
    ///
    /// # Errors
    /// Returns error if the node is unreachable or storage cannot be read.
    pub async fn connect(
        config: ExplorerConfig,
        storage: Arc<dyn Storage>,
        decoder: Arc<dyn LogDecoder>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let reader = RpcChainReader::connect(&config.rpc_url)
            .await
            .wrap_err_with(|| format!("failed to connect to {}", config.rpc_url))?;
        Self::new(Arc::new(reader), config, storage, decoder, notifier)
    }
}

impl<R: ChainReader> Explorer<R> {
    /// Builds an explorer over an existing reader.
    ///
    /// `config.max_stored_events` seeds the event settings only when none
    /// have been persisted yet.
    ///
    /// # Errors
    /// Returns error if storage cannot be read or written.
    pub fn new(
        reader: Arc<R>,
        config: ExplorerConfig,
        storage: Arc<dyn Storage>,
        decoder: Arc<dyn LogDecoder>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let fetcher = BatchFetcher::with_capacities(
            Arc::clone(&reader),
            config.block_cache_capacity,
            config.receipt_cache_capacity,
        )
        .with_batch_sizes(config.block_batch_size, config.receipt_batch_size);

        let head = HeadPoller::new(Arc::clone(&reader), config.polling_interval);
        let seed_settings = storage.load(SETTINGS_KEY)?.is_none();
        let events = SubscriptionManager::new(
            reader,
            storage,
            decoder,
            notifier,
            config.polling_interval,
        );
        if seed_settings {
            events.update_settings(EventSettings {
                max_events: config.max_stored_events,
                ..EventSettings::default()
            })?;
        }

        Ok(Self {
            config,
            fetcher: Arc::new(fetcher),
            head: Arc::new(head),
            queries: Arc::new(QueryClient::new()),
            events,
        })
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Arc<BatchFetcher<R>> {
        &self.fetcher
    }

    pub fn head(&self) -> &Arc<HeadPoller<R>> {
        &self.head
    }

    pub fn queries(&self) -> &Arc<QueryClient> {
        &self.queries
    }

    pub fn events(&self) -> &Arc<SubscriptionManager<R>> {
        &self.events
    }

    fn live(&self) -> QueryPolicy {
        QueryPolicy::stale_after(self.config.latest_stale_time)
    }

    fn stats(&self) -> QueryPolicy {
        QueryPolicy::stale_after(self.config.stats_stale_time)
    }

    /// Invalidates head-dependent queries whenever the shared head poller
    /// sees a new block. Dropping the handle stops following.
    pub fn follow_head(&self) -> WatchHandle {
        let mut heads = self.head.subscribe();
        let queries = Arc::clone(&self.queries);
        WatchHandle::spawn(async move {
            while let Some(number) = heads.next().await {
                let dropped = queries.invalidate_head_dependent();
                tracing::debug!(block_number = number, dropped, "new head");
            }
        })
    }

    /// One block by number.
    ///
    /// Served by the fetcher's bounded block cache rather than the query
    /// client. A missing block is not cached, so one mined later is picked up.
    ///
    /// # Errors
    /// Returns error if the node request fails.
    pub async fn block(&self, number: u64, include_transactions: bool) -> Result<Option<Block>> {
        self.fetcher.block(number, include_transactions).await
    }

    /// Receipt for a `0x`-prefixed transaction hash, from the bounded receipt cache.
    ///
    /// # Errors
    /// Returns error for a malformed hash or a failed fetch.
    pub async fn receipt(&self, hash: &str) -> Result<Option<Receipt>> {
        let hash = parse_tx_hash(hash)?;
        self.fetcher.receipt(hash).await
    }

    /// Transaction body for a `0x`-prefixed hash, from the bounded transaction cache.
    ///
    /// # Errors
    /// Returns error for a malformed hash or a failed fetch.
    pub async fn transaction(&self, hash: &str) -> Result<Option<Transaction>> {
        let hash = parse_tx_hash(hash)?;
        self.fetcher.transaction(hash).await
    }

    /// Newest `count` blocks, newest first. Blocks that failed to load are left out.
    pub async fn latest_blocks(&self, count: u64, include_transactions: bool) -> Result<Vec<Block>> {
        let key = QueryKey::LatestBlocks {
            count,
            include_transactions,
        };
        let mut options = self.fetcher.block_options();
        options.include_transactions = include_transactions;
        self.queries
            .fetch(key, self.live(), move || async move {
                Ok(self.fetcher.latest_blocks(count, options).await?.into_items())
            })
            .await
    }

    pub async fn latest_transactions(
        &self,
        block_count: u64,
        limit: usize,
    ) -> Result<Vec<EnrichedTransaction>> {
        let key = QueryKey::LatestTransactions { block_count, limit };
        self.queries
            .fetch(key, self.live(), move || {
                self.fetcher.latest_transactions(block_count, limit)
            })
            .await
    }

    pub async fn tps(&self, start_block: u64, end_block: u64) -> Result<f64> {
        let key = QueryKey::Tps {
            start_block,
            end_block,
        };
        self.queries
            .fetch(key, self.stats(), move || async move {
                Ok(calculate_tps(&self.fetcher, start_block, end_block).await)
            })
            .await
    }

    pub async fn average_block_time(&self, count: u64) -> Result<f64> {
        self.queries
            .fetch(QueryKey::AverageBlockTime(count), self.stats(), move || async move {
                Ok(calculate_average_block_time(&self.fetcher, count).await)
            })
            .await
    }

    pub async fn network_stats(&self, window: u64) -> Result<NetworkStats> {
        self.queries
            .fetch(QueryKey::NetworkStats(window), self.stats(), move || async move {
                Ok(get_network_stats(&self.fetcher, window).await)
            })
            .await
    }

    pub async fn transaction_volume(&self, count: u64) -> Result<TransactionVolume> {
        self.queries
            .fetch(QueryKey::TransactionVolume(count), self.stats(), move || async move {
                Ok(get_transaction_volume(&self.fetcher, count).await)
            })
            .await
    }

    pub async fn active_addresses(&self, count: u64) -> Result<ActiveAddresses> {
        self.queries
            .fetch(QueryKey::ActiveAddresses(count), self.stats(), move || async move {
                Ok(get_active_addresses(&self.fetcher, count).await)
            })
            .await
    }

    pub async fn gas_statistics(&self, count: u64) -> Result<GasStatistics> {
        self.queries
            .fetch(QueryKey::GasStatistics(count), self.stats(), move || async move {
                Ok(get_gas_statistics(&self.fetcher, count).await)
            })
            .await
    }

    pub async fn top_gas_consumers(&self, count: u64, limit: usize) -> Result<Vec<GasConsumer>> {
        self.queries
            .fetch(QueryKey::TopGasConsumers { count, limit }, self.stats(), move || async move {
                Ok(get_top_gas_consumers(&self.fetcher, count, limit).await)
            })
            .await
    }

    pub async fn gas_trends(&self, count: u64, sample_size: u64) -> Result<Vec<GasTrendPoint>> {
        self.queries
            .fetch(
                QueryKey::GasTrends { count, sample_size },
                self.stats(),
                move || async move { Ok(get_gas_trends(&self.fetcher, count, sample_size).await) },
            )
            .await
    }

    /// Stops the head poller and every subscription watch.
    pub fn shutdown(&self) {
        self.head.stop();
        self.events.stop_all();
    }
}
