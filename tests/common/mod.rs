//! Shared test helpers: an in-memory chain and sample factories.
//!
//! `FakeChain` implements `ChainReader` over blocks held in memory. It counts
//! every call, logs when each block request starts and settles, and records
//! peak concurrency so tests can check batching and caching behaviour.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use alloy::primitives::{Address, Bytes, B256, U256};
use eyre::{eyre, Result};
use explorer_data::{
    Block, BlockTransactions, ChainReader, Log, LogFilter, Receipt, ReceiptStatus, Transaction,
};
use parking_lot::Mutex;

/// First block timestamp; blocks are two seconds apart.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const BLOCK_TIME: u64 = 2;
pub const GAS_LIMIT: u64 = 30_000_000;

#[derive(Default)]
pub struct FakeChain {
    head: AtomicU64,
    blocks: Mutex<BTreeMap<u64, Block>>,
    receipts: Mutex<HashMap<B256, Receipt>>,
    logs: Mutex<Vec<Log>>,
    failing_blocks: Mutex<HashSet<u64>>,
    head_unavailable: AtomicBool,
    block_calls: AtomicUsize,
    receipt_calls: AtomicUsize,
    transaction_calls: AtomicUsize,
    number_calls: AtomicUsize,
    log_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    receipt_in_flight: AtomicUsize,
    max_receipt_in_flight: AtomicUsize,
    block_events: Mutex<Vec<BlockCall>>,
}

/// One edge of a `get_block` call, in the order the chain saw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockCall {
    Started(u64),
    Settled(u64),
}

impl FakeChain {
    /// Chain of empty blocks `0..=head`.
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    /// Moves the head, mining empty blocks up to it.
    pub fn set_head(&self, head: u64) {
        let mut blocks = self.blocks.lock();
        for number in 0..=head {
            blocks.entry(number).or_insert_with(|| empty_block(number));
        }
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn head(&self) -> u64 {
        self.head.load(Ordering::SeqCst)
    }

    /// Adds a mined transaction (and its receipt) to an existing block.
    pub fn add_transaction(&self, block_number: u64, tx: Transaction, mut receipt: Receipt) {
        let mut blocks = self.blocks.lock();
        let block = blocks
            .entry(block_number)
            .or_insert_with(|| empty_block(block_number));
        block.gas_used += receipt.gas_used;
        if let BlockTransactions::Full(txs) = &mut block.transactions {
            txs.push(tx);
        }
        receipt.block_number = Some(block_number);
        self.receipts.lock().insert(receipt.transaction_hash, receipt);
    }

    pub fn set_timestamp(&self, block_number: u64, timestamp: u64) {
        if let Some(block) = self.blocks.lock().get_mut(&block_number) {
            block.timestamp = timestamp;
        }
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().push(log);
    }

    /// Makes `get_block(number)` fail with a transport error.
    pub fn fail_block(&self, number: u64) {
        self.failing_blocks.lock().insert(number);
    }

    pub fn set_head_unavailable(&self, unavailable: bool) {
        self.head_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    pub fn number_calls(&self) -> usize {
        self.number_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    /// Highest number of block requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of receipt requests observed in flight at once.
    pub fn max_receipt_in_flight(&self) -> usize {
        self.max_receipt_in_flight.load(Ordering::SeqCst)
    }

    pub fn block_call_log(&self) -> Vec<BlockCall> {
        self.block_events.lock().clone()
    }

    pub fn reset_counters(&self) {
        self.block_events.lock().clear();
        for counter in [
            &self.block_calls,
            &self.receipt_calls,
            &self.transaction_calls,
            &self.number_calls,
            &self.log_calls,
            &self.max_in_flight,
            &self.max_receipt_in_flight,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

impl ChainReader for FakeChain {
    async fn get_block_number(&self) -> Result<u64> {
        self.number_calls.fetch_add(1, Ordering::SeqCst);
        if self.head_unavailable.load(Ordering::SeqCst) {
            return Err(eyre!("connection refused"));
        }
        Ok(self.head())
    }

    async fn get_block(&self, number: u64, include_transactions: bool) -> Result<Option<Block>> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        self.block_events.lock().push(BlockCall::Started(number));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Let every request of a batch start before any of them finishes.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.block_events.lock().push(BlockCall::Settled(number));

        if self.failing_blocks.lock().contains(&number) {
            return Err(eyre!("block {number}: connection reset"));
        }
        if number > self.head() {
            return Ok(None);
        }

        let block = self.blocks.lock().get(&number).cloned();
        Ok(block.map(|mut block| {
            if !include_transactions {
                block.transactions = BlockTransactions::Hashes(block.transactions.hashes());
            }
            block
        }))
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<Transaction>> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        let blocks = self.blocks.lock();
        Ok(blocks
            .values()
            .flat_map(|block| block.transactions.full())
            .find(|tx| tx.hash == hash)
            .cloned())
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.receipt_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_receipt_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.receipt_in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.receipts.lock().get(&hash).cloned())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .logs
            .lock()
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }
}

pub fn empty_block(number: u64) -> Block {
    Block {
        number,
        hash: hash(number + 1_000_000),
        parent_hash: hash(number.saturating_sub(1) + 1_000_000),
        timestamp: GENESIS_TIMESTAMP + number * BLOCK_TIME,
        gas_used: 0,
        gas_limit: GAS_LIMIT,
        base_fee_per_gas: Some(1_000_000_000),
        miner: Address::ZERO,
        transactions: BlockTransactions::Full(Vec::new()),
    }
}

/// Deterministic 32-byte hash from a seed.
pub fn hash(seed: u64) -> B256 {
    B256::left_padding_from(&seed.to_be_bytes())
}

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// Transaction with a seed-derived hash.
pub fn sample_tx(seed: u64, from: Address, to: Option<Address>, value: u64, input: &[u8]) -> Transaction {
    Transaction {
        hash: hash(seed),
        from,
        to,
        value: U256::from(value),
        input: Bytes::copy_from_slice(input),
        gas: 100_000,
        gas_price: 2_000_000_000,
        nonce: seed,
    }
}

pub fn sample_receipt(tx: &Transaction, gas_used: u64, succeeded: bool) -> Receipt {
    Receipt {
        transaction_hash: tx.hash,
        block_number: None,
        status: if succeeded {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Failure
        },
        gas_used,
        effective_gas_price: 2_000_000_000,
        contract_address: None,
        logs: Vec::new(),
    }
}

/// Log emitted by `address` in `block_number` with the given topics.
pub fn sample_log(address: Address, block_number: u64, topics: Vec<B256>, data: Bytes, index: u64) -> Log {
    Log {
        address,
        topics,
        data,
        log_index: Some(index),
        block_number: Some(block_number),
        transaction_hash: Some(hash(block_number * 1_000 + index)),
    }
}
