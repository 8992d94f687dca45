//! Type definitions for chain data served by the explorer.
//!
//! Blocks, transactions and receipts are immutable once fetched from the
//! node; they are cached and shared by value.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Transaction list carried by a block, in block order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BlockTransactions {
    /// Full transaction bodies (`includeTransactions = true`).
    Full(Vec<Transaction>),
    /// Transaction hashes only.
    Hashes(Vec<B256>),
}

impl BlockTransactions {
    /// Number of transactions in the block regardless of shape.
    pub fn len(&self) -> usize {
        match self {
            Self::Full(txs) => txs.len(),
            Self::Hashes(hashes) => hashes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transaction hashes in block order.
    pub fn hashes(&self) -> Vec<B256> {
        match self {
            Self::Full(txs) => txs.iter().map(|tx| tx.hash).collect(),
            Self::Hashes(hashes) => hashes.clone(),
        }
    }

    /// Full bodies, empty when the block was fetched without them.
    pub fn full(&self) -> &[Transaction] {
        match self {
            Self::Full(txs) => txs,
            Self::Hashes(_) => &[],
        }
    }
}

/// On-chain block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Timestamp in unix seconds.
    pub timestamp: u64,
    /// Gas used.
    pub gas_used: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Base fee per gas in Wei (absent before London).
    pub base_fee_per_gas: Option<u128>,
    /// Miner/coinbase address.
    pub miner: Address,
    /// Transactions in block order.
    pub transactions: BlockTransactions,
}

impl Block {
    /// Number of transactions in the block.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

/// Transaction body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender address.
    pub from: Address,
    /// Recipient address (None for contract creation).
    pub to: Option<Address>,
    /// Value in Wei.
    pub value: U256,
    /// Calldata.
    pub input: Bytes,
    /// Gas limit.
    pub gas: u64,
    /// Gas price in Wei (max fee per gas for EIP-1559 transactions).
    pub gas_price: u128,
    /// Sender nonce.
    pub nonce: u64,
}

impl Transaction {
    /// True when the transaction deploys a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// Transaction with the owning block's number and timestamp attached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub block_number: u64,
    pub timestamp: u64,
}

/// Execution status from the receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Failure,
}

/// Transaction receipt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Hash of the transaction this receipt belongs to.
    pub transaction_hash: B256,
    /// Block number containing the transaction.
    pub block_number: Option<u64>,
    /// Execution status.
    pub status: ReceiptStatus,
    /// Gas used by this transaction.
    pub gas_used: u64,
    /// Effective gas price in Wei.
    pub effective_gas_price: u128,
    /// Address of the deployed contract, for creations.
    pub contract_address: Option<Address>,
    /// Emitted logs in order.
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// Raw event log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Address of the contract that emitted the log.
    pub address: Address,
    /// Indexed topics; topic0 is the event signature for non-anonymous events.
    pub topics: Vec<B256>,
    /// Non-indexed data.
    pub data: Bytes,
    /// Log index within the block.
    pub log_index: Option<u64>,
    /// Block number containing this log.
    pub block_number: Option<u64>,
    /// Transaction that emitted this log.
    pub transaction_hash: Option<B256>,
}

impl Log {
    /// Event signature topic, if any.
    pub fn topic0(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}
