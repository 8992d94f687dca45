//! Chain access capability and its Alloy JSON-RPC implementation.
//!
//! Everything above this module talks to the node through [`ChainReader`],
//! so tests can substitute an in-memory chain.

use std::future::Future;
use std::sync::Arc;

use alloy::network::{Ethereum, TransactionResponse};
use alloy::primitives::{Address, B256};
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::{BlockId, BlockNumberOrTag, Filter};
use eyre::{Context, Result};

use crate::types::{Block, BlockTransactions, Log, Receipt, ReceiptStatus, Transaction};

/// Read access to a node. The only component that makes network round-trips.
///
/// `Ok(None)` means the node answered but has no such object (not mined yet,
/// unknown hash); `Err` means the request itself failed.
pub trait ChainReader: Send + Sync + 'static {
    fn get_block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    fn get_block(
        &self,
        number: u64,
        include_transactions: bool,
    ) -> impl Future<Output = Result<Option<Block>>> + Send;

    fn get_transaction(&self, hash: B256)
        -> impl Future<Output = Result<Option<Transaction>>> + Send;

    fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<Receipt>>> + Send;

    fn get_logs(&self, filter: &LogFilter) -> impl Future<Output = Result<Vec<Log>>> + Send;
}

/// Log query over an inclusive block range.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Emitting contract; any contract when `None`.
    pub address: Option<Address>,
    /// Required topic0; any event when `None`.
    pub event_signature: Option<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    /// True when `log` falls inside this filter.
    pub fn matches(&self, log: &Log) -> bool {
        let in_range = log
            .block_number
            .map_or(true, |n| n >= self.from_block && n <= self.to_block);
        let address_ok = self.address.map_or(true, |a| a == log.address);
        let topic_ok = self
            .event_signature
            .map_or(true, |sig| log.topic0() == Some(sig));
        in_range && address_ok && topic_ok
    }
}

type ProviderType = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider<Ethereum>,
>;

/// [`ChainReader`] backed by an Alloy HTTP provider (Anvil, Reth, Geth...).
#[derive(Clone)]
pub struct RpcChainReader {
    provider: Arc<ProviderType>,
}

impl RpcChainReader {
    /// Creates a reader and tests RPC connectivity via `eth_blockNumber`.
    ///
    /// # Errors
    /// Returns error if the URL is malformed or the node does not answer.
    #[tracing::instrument(skip_all, fields(rpc_url = %rpc_url))]
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let provider =
            ProviderBuilder::new().on_http(rpc_url.parse().wrap_err("invalid RPC URL format")?);
        let provider = Arc::new(provider);

        let block_number = provider
            .get_block_number()
            .await
            .wrap_err("failed to test RPC connectivity with eth_blockNumber")?;

        tracing::info!(
            rpc_url = %rpc_url,
            latest_block = block_number,
            "RPC connection successful"
        );

        Ok(Self { provider })
    }
}

impl ChainReader for RpcChainReader {
    async fn get_block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("eth_blockNumber failed")
    }

    async fn get_block(&self, number: u64, include_transactions: bool) -> Result<Option<Block>> {
        let call = self
            .provider
            .get_block(BlockId::Number(BlockNumberOrTag::Number(number)));
        let call = if include_transactions {
            call.full()
        } else {
            call.hashes()
        };
        let block = call
            .await
            .wrap_err_with(|| format!("failed to fetch block {}", number))?;

        Ok(block.map(convert_block))
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<Transaction>> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .wrap_err_with(|| format!("failed to fetch transaction {}", hash))?;

        Ok(tx.map(|tx| convert_transaction(&tx)))
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .wrap_err_with(|| format!("failed to fetch receipt {}", hash))?;

        Ok(receipt.map(|receipt| {
            let status = if receipt.status() {
                ReceiptStatus::Success
            } else {
                ReceiptStatus::Failure
            };
            Receipt {
                transaction_hash: receipt.transaction_hash,
                block_number: receipt.block_number,
                status,
                gas_used: receipt.gas_used as u64,
                effective_gas_price: receipt.effective_gas_price,
                contract_address: receipt.contract_address,
                logs: receipt.inner.logs().iter().map(convert_log).collect(),
            }
        }))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        let mut rpc_filter = Filter::new()
            .from_block(filter.from_block)
            .to_block(filter.to_block);
        if let Some(address) = filter.address {
            rpc_filter = rpc_filter.address(address);
        }
        if let Some(signature) = filter.event_signature {
            rpc_filter = rpc_filter.event_signature(signature);
        }

        let logs = self
            .provider
            .get_logs(&rpc_filter)
            .await
            .wrap_err_with(|| {
                format!(
                    "eth_getLogs failed for blocks {}..={}",
                    filter.from_block, filter.to_block
                )
            })?;

        Ok(logs.iter().map(convert_log).collect())
    }
}

fn convert_block(block: alloy::rpc::types::Block) -> Block {
    let header = &block.header;
    let number = header.number;
    let hash = header.hash;
    let parent_hash = header.parent_hash;
    let timestamp = header.timestamp;
    let gas_used = header.gas_used;
    let gas_limit = header.gas_limit;
    let base_fee_per_gas = header.base_fee_per_gas.map(u128::from);
    let miner = header.beneficiary;

    let transactions = match block.transactions {
        alloy::rpc::types::BlockTransactions::Full(txs) => {
            BlockTransactions::Full(txs.iter().map(convert_transaction).collect())
        }
        alloy::rpc::types::BlockTransactions::Hashes(hashes) => BlockTransactions::Hashes(hashes),
        alloy::rpc::types::BlockTransactions::Uncle => BlockTransactions::Hashes(Vec::new()),
    };

    Block {
        number,
        hash,
        parent_hash,
        timestamp,
        gas_used,
        gas_limit,
        base_fee_per_gas,
        miner,
        transactions,
    }
}

fn convert_transaction(tx: &alloy::rpc::types::Transaction) -> Transaction {
    let gas_price = alloy::consensus::Transaction::gas_price(tx)
        .unwrap_or_else(|| alloy::consensus::Transaction::max_fee_per_gas(tx));

    Transaction {
        hash: TransactionResponse::tx_hash(tx),
        from: TransactionResponse::from(tx),
        to: alloy::consensus::Transaction::to(tx),
        value: alloy::consensus::Transaction::value(tx),
        input: alloy::consensus::Transaction::input(tx).clone(),
        gas: alloy::consensus::Transaction::gas_limit(tx),
        gas_price,
        nonce: alloy::consensus::Transaction::nonce(tx),
    }
}

fn convert_log(log: &alloy::rpc::types::Log) -> Log {
    Log {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        log_index: log.log_index,
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
    }
}
