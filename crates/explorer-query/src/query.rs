//! Keyed query client with staleness policies and in-flight de-duplication.
//!
//! Every logical query has a [`QueryKey`]. At most one fetch per key runs at
//! a time; concurrent callers for the same key wait for it and share its
//! result. Successful results are kept until their [`QueryPolicy`] says they
//! are stale or until they are invalidated. Failures are never kept.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use eyre::Result;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Logical queries the explorer issues.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    LatestBlocks { count: u64, include_transactions: bool },
    LatestTransactions { block_count: u64, limit: usize },
    Tps { start_block: u64, end_block: u64 },
    AverageBlockTime(u64),
    NetworkStats(u64),
    TransactionVolume(u64),
    ActiveAddresses(u64),
    GasStatistics(u64),
    TopGasConsumers { count: u64, limit: usize },
    GasTrends { count: u64, sample_size: u64 },
}

impl QueryKey {
    /// True for queries whose answer moves with the chain head.
    pub fn is_head_dependent(&self) -> bool {
        !matches!(self, Self::Tps { .. })
    }
}

/// How long a successful result may be served without refetching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryPolicy {
    /// `None` means the result never goes stale.
    pub stale_time: Option<Duration>,
}

impl QueryPolicy {
    /// Never stale; only invalidation removes the result.
    pub const IMMUTABLE: Self = Self { stale_time: None };
    /// Latest-N views.
    pub const LIVE: Self = Self::stale_after(Duration::from_millis(1000));
    /// Aggregations over a window.
    pub const STATS: Self = Self::stale_after(Duration::from_secs(10));

    /// Policy whose results go stale `stale_time` after they were fetched.
    pub const fn stale_after(stale_time: Duration) -> Self {
        Self {
            stale_time: Some(stale_time),
        }
    }

    fn is_fresh(&self, fetched_at: Instant) -> bool {
        match self.stale_time {
            None => true,
            Some(stale_time) => fetched_at.elapsed() < stale_time,
        }
    }
}

struct CachedValue {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
}

type Slot = Arc<Mutex<Option<CachedValue>>>;

/// Keyed result cache shared by every explorer query.
///
/// Each key owns one slot guarded by an async mutex, so a second caller for a
/// key waits for the first caller's fetch instead of issuing its own. Slots
/// exist only for keys with a successful result or a fetch in flight.
///
/// # Example
/// ```no_run
/// # async fn run() -> eyre::Result<()> {
/// use explorer_query::{QueryClient, QueryKey, QueryPolicy};
///
/// let client = QueryClient::new();
/// let block_time = client
///     .fetch(QueryKey::AverageBlockTime(50), QueryPolicy::STATS, || async { Ok(2.0f64) })
///     .await?;
/// assert_eq!(block_time, 2.0);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct QueryClient {
    slots: DashMap<QueryKey, Slot>,
}

impl QueryClient {
    /// Creates an empty client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key` if it is still fresh, otherwise
    /// runs `fetch` and caches its success.
    ///
    /// # Arguments
    /// * `key` - Logical query identity; concurrent callers with equal keys share one fetch
    /// * `policy` - How long a cached success may be served
    /// * `fetch` - Produces the value on a miss
    ///
    /// # Errors
    /// Returns whatever `fetch` returns; errors are not cached.
    pub async fn fetch<V, F, Fut>(&self, key: QueryKey, policy: QueryPolicy, fetch: F) -> Result<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let slot = Arc::clone(self.slots.entry(key.clone()).or_default().value());
        let mut cached = slot.lock().await;

        if let Some(entry) = cached.as_ref() {
            if policy.is_fresh(entry.fetched_at) {
                if let Some(value) = entry.value.downcast_ref::<V>() {
                    tracing::trace!(?key, "query hit");
                    return Ok(value.clone());
                }
            }
        }

        tracing::debug!(?key, "query fetch");
        let value = match fetch().await {
            Ok(value) => value,
            Err(e) => {
                let never_filled = cached.is_none();
                drop(cached);
                if never_filled {
                    self.release_empty_slot(&key, &slot);
                }
                return Err(e);
            }
        };
        *cached = Some(CachedValue {
            value: Arc::new(value.clone()),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// Removes `slot` from the map if it is still the slot for `key`, holds
    /// no value and no other caller is waiting on it.
    fn release_empty_slot(&self, key: &QueryKey, slot: &Slot) {
        self.slots.remove_if(key, |_, current| {
            Arc::ptr_eq(current, slot) && current.try_lock().is_ok_and(|value| value.is_none())
        });
    }

    /// Drops every cached result whose key matches `predicate`.
    ///
    /// A fetch already in flight for a dropped key still completes for its
    /// waiters, but later callers fetch afresh.
    pub fn invalidate<P>(&self, predicate: P) -> usize
    where
        P: Fn(&QueryKey) -> bool,
    {
        let before = self.slots.len();
        self.slots.retain(|key, _| !predicate(key));
        before - self.slots.len()
    }

    /// Drops the result for one key. Returns false if nothing was cached.
    pub fn invalidate_key(&self, key: &QueryKey) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Drops all results that depend on the chain head.
    pub fn invalidate_head_dependent(&self) -> usize {
        self.invalidate(QueryKey::is_head_dependent)
    }

    /// Drops every cached result.
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of keys with a cached result or a fetch in flight.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
