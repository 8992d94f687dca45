//! Log decoding against registered contract ABIs.
//!
//! Decoding is optional: a log that matches no known event is kept raw.

use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, LogData};
use dashmap::DashMap;
use eyre::{Context, Result};
use explorer_data::Log;
use serde::{Deserialize, Serialize};

/// One decoded event parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedArg {
    pub name: String,
    /// Solidity type, e.g. `uint256`.
    pub kind: String,
    pub indexed: bool,
    /// Display form of the value.
    pub value: String,
}

/// Named event with its arguments in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub name: String,
    /// Canonical signature, e.g. `Transfer(address,address,uint256)`.
    pub signature: String,
    pub args: Vec<DecodedArg>,
}

/// Decoding capability consumed by the subscription manager.
pub trait LogDecoder: Send + Sync {
    fn decode(&self, log: &Log) -> Option<DecodedEvent>;

    /// Human name for a contract, if one is known.
    fn contract_name(&self, _address: &Address) -> Option<String> {
        None
    }
}

/// Decoder that knows no ABIs; every log stays raw.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawDecoder;

impl LogDecoder for RawDecoder {
    fn decode(&self, _log: &Log) -> Option<DecodedEvent> {
        None
    }
}

struct RegisteredContract {
    name: Option<String>,
    abi: JsonAbi,
}

/// Address → ABI lookup used to decode logs by topic0.
#[derive(Default)]
pub struct AbiRegistry {
    contracts: DashMap<Address, RegisteredContract>,
}

impl AbiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: Address, name: Option<String>, abi: JsonAbi) {
        tracing::debug!(%address, events = abi.events().count(), "ABI registered");
        self.contracts
            .insert(address, RegisteredContract { name, abi });
    }

    /// Registers an ABI given as a JSON array (the `abi` field of a build artifact).
    ///
    /// # Errors
    /// Returns error if the JSON is not a valid ABI.
    pub fn register_json(&self, address: Address, name: Option<String>, json: &str) -> Result<()> {
        let abi: JsonAbi = serde_json::from_str(json)
            .wrap_err_with(|| format!("invalid ABI JSON for {address}"))?;
        self.register(address, name, abi);
        Ok(())
    }

    pub fn remove(&self, address: &Address) -> bool {
        self.contracts.remove(address).is_some()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl LogDecoder for AbiRegistry {
    fn decode(&self, log: &Log) -> Option<DecodedEvent> {
        let contract = self.contracts.get(&log.address)?;
        let topic0 = log.topic0()?;
        let event = contract
            .abi
            .events()
            .find(|event| !event.anonymous && event.selector() == topic0)?;

        let data = LogData::new(log.topics.clone(), log.data.clone())?;
        let decoded = match event.decode_log(&data, true) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(event = %event.name, error = %e, "log matched selector but failed to decode");
                return None;
            }
        };

        let mut indexed = decoded.indexed.iter();
        let mut body = decoded.body.iter();
        let args = event
            .inputs
            .iter()
            .map(|param| {
                let value = if param.indexed {
                    indexed.next()
                } else {
                    body.next()
                };
                DecodedArg {
                    name: param.name.clone(),
                    kind: param.ty.clone(),
                    indexed: param.indexed,
                    value: value.map(format_value).unwrap_or_default(),
                }
            })
            .collect();

        Some(DecodedEvent {
            name: event.name.clone(),
            signature: event.signature(),
            args,
        })
    }

    fn contract_name(&self, address: &Address) -> Option<String> {
        self.contracts
            .get(address)
            .and_then(|contract| contract.name.clone())
    }
}

fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(address) => address.to_checksum(None),
        DynSolValue::Bool(flag) => flag.to_string(),
        DynSolValue::Int(int, _) => int.to_string(),
        DynSolValue::Uint(uint, _) => uint.to_string(),
        DynSolValue::FixedBytes(word, size) => {
            format!("0x{}", alloy::hex::encode(&word[..*size]))
        }
        DynSolValue::Bytes(bytes) => format!("0x{}", alloy::hex::encode(bytes)),
        DynSolValue::String(text) => text.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            let parts: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", parts.join(", "))
        }
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256, Bytes, B256, U256};

    const ERC20_EVENTS: &str = r#"[
        {"type":"event","name":"Transfer","anonymous":false,"inputs":[
            {"name":"from","type":"address","indexed":true},
            {"name":"to","type":"address","indexed":true},
            {"name":"value","type":"uint256","indexed":false}]},
        {"type":"event","name":"Approval","anonymous":false,"inputs":[
            {"name":"owner","type":"address","indexed":true},
            {"name":"spender","type":"address","indexed":true},
            {"name":"value","type":"uint256","indexed":false}]}
    ]"#;

    const TOKEN: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
    const TRANSFER_TOPIC: B256 =
        b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

    fn transfer_log(address: Address) -> Log {
        let from = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let to = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
        Log {
            address,
            topics: vec![TRANSFER_TOPIC, from.into_word(), to.into_word()],
            data: Bytes::from(U256::from(1_000u64).to_be_bytes::<32>().to_vec()),
            log_index: Some(0),
            block_number: Some(1),
            transaction_hash: None,
        }
    }

    #[test]
    fn decodes_registered_transfer() {
        let registry = AbiRegistry::new();
        registry
            .register_json(TOKEN, Some("Token".to_string()), ERC20_EVENTS)
            .expect("ABI should parse");

        let decoded = registry
            .decode(&transfer_log(TOKEN))
            .expect("transfer should decode");
        assert_eq!(decoded.name, "Transfer");
        assert_eq!(decoded.signature, "Transfer(address,address,uint256)");
        assert_eq!(decoded.args.len(), 3);
        assert_eq!(decoded.args[0].name, "from");
        assert!(decoded.args[0].indexed);
        assert_eq!(
            decoded.args[0].value,
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        assert_eq!(decoded.args[2].value, "1000");
        assert_eq!(registry.contract_name(&TOKEN), Some("Token".to_string()));
    }

    #[test]
    fn unknown_contract_stays_raw() {
        let registry = AbiRegistry::new();
        registry
            .register_json(TOKEN, None, ERC20_EVENTS)
            .expect("ABI should parse");

        assert!(registry.decode(&transfer_log(Address::ZERO)).is_none());
        assert!(RawDecoder.decode(&transfer_log(TOKEN)).is_none());
    }

    #[test]
    fn rejects_malformed_abi() {
        let registry = AbiRegistry::new();
        assert!(registry.register_json(TOKEN, None, "{").is_err());
        assert!(registry.is_empty());
    }
}
