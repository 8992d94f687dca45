//! Bounded in-memory caches for blocks, receipts and transactions.
//!
//! Eviction is by insertion order: when a new key arrives at capacity the
//! oldest-inserted entry is dropped, regardless of how recently it was read.
//! Entries never expire; fetched chain data is treated as immutable.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use alloy::primitives::B256;
use parking_lot::Mutex;

use crate::types::{Block, Receipt, Transaction};

/// Default number of blocks to cache.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 1000;
/// Default number of receipts to cache.
pub const DEFAULT_RECEIPT_CACHE_CAPACITY: usize = 500;

/// Fixed-capacity map that evicts the oldest-inserted key first.
///
/// Overwriting an existing key replaces its value but keeps its original
/// insertion position.
#[derive(Debug)]
pub struct InsertionOrderCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K, V> InsertionOrderCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty cache. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns a clone of the cached value. Reads do not affect eviction order.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// True if `key` is cached. Like `get`, this does not touch eviction order.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts `value`, returning the evicted key if capacity was exceeded.
    pub fn put(&mut self, key: K, value: V) -> Option<K> {
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = value;
            return None;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                evicted = Some(oldest);
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        evicted
    }

    /// Drops every entry. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of cached entries, never above `capacity`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries before the oldest is evicted.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Cache key for blocks: the two transaction shapes are cached separately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub number: u64,
    pub include_transactions: bool,
}

impl BlockKey {
    pub fn new(number: u64, include_transactions: bool) -> Self {
        Self {
            number,
            include_transactions,
        }
    }
}

/// Thread-safe wrapper shared by every component that reads chain data.
#[derive(Debug)]
pub struct SharedCache<K, V> {
    inner: Mutex<InsertionOrderCache<K, V>>,
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    /// Creates an empty shared cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(InsertionOrderCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key)
    }

    /// Inserts `value`, evicting the oldest-inserted entry when full.
    pub fn put(&self, key: K, value: V) {
        if let Some(evicted) = self.inner.lock().put(key, value) {
            tracing::trace!(?evicted, "cache entry evicted");
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Current number of entries.
    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}

/// Blocks keyed by (number, include_transactions).
pub type BlockCache = SharedCache<BlockKey, Block>;
/// Receipts keyed by transaction hash.
pub type ReceiptCache = SharedCache<B256, Receipt>;
/// Transaction bodies keyed by hash.
pub type TransactionCache = SharedCache<B256, Transaction>;
