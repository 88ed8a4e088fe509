//! Value types exchanged with the chain collaborator.

use serde::{Serialize, Serializer};
use serde_json::{Value, json};

use crate::error::ChainError;
use crate::identity::{TxHash, WalletAddress};

/// A fully specified transaction the caller's wallet signs and broadcasts.
///
/// Serialized with `0x` hex quantities, the shape wallets accept for
/// `eth_signTransaction`/`eth_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    #[serde(serialize_with = "prefixed_address")]
    pub from: WalletAddress,
    #[serde(serialize_with = "prefixed_opt_address")]
    pub to: Option<WalletAddress>,
    #[serde(serialize_with = "quantity_u64")]
    pub nonce: u64,
    #[serde(serialize_with = "quantity_u64")]
    pub gas: u64,
    #[serde(serialize_with = "quantity_u128")]
    pub gas_price: u128,
    #[serde(serialize_with = "quantity_u128")]
    pub value: u128,
    #[serde(serialize_with = "hex_data")]
    pub input: Vec<u8>,
    #[serde(serialize_with = "quantity_u64")]
    pub chain_id: u64,
}

/// Message for `eth_estimateGas` and `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<WalletAddress>,
    pub to: Option<WalletAddress>,
    pub data: Vec<u8>,
}

impl CallRequest {
    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        if let Some(from) = &self.from {
            obj.insert("from".to_string(), json!(from.to_prefixed()));
        }
        if let Some(to) = &self.to {
            obj.insert("to".to_string(), json!(to.to_prefixed()));
        }
        obj.insert("data".to_string(), json!(format!("0x{}", hex::encode(&self.data))));
        Value::Object(obj)
    }
}

/// The parts of a receipt this service interprets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub from: WalletAddress,
    pub to: Option<WalletAddress>,
    pub contract_address: Option<WalletAddress>,
    pub block_number: u64,
}

impl TransactionReceipt {
    /// Parse a non-null `eth_getTransactionReceipt` result.
    pub fn from_json(value: &Value) -> Result<Self, ChainError> {
        let field = |name: &str| value.get(name).and_then(Value::as_str);
        let opt_address = |name: &str| -> Result<Option<WalletAddress>, ChainError> {
            field(name)
                .map(WalletAddress::parse)
                .transpose()
                .map_err(|e| ChainError::Decode(format!("receipt.{name}: {e}")))
        };

        let tx_hash = TxHash::parse(
            field("transactionHash")
                .ok_or_else(|| ChainError::Decode("receipt.transactionHash missing".into()))?,
        )
        .map_err(|e| ChainError::Decode(e.to_string()))?;
        let from = opt_address("from")?
            .ok_or_else(|| ChainError::Decode("receipt.from missing".into()))?;
        let status = field("status")
            .map(parse_quantity)
            .transpose()?
            .ok_or_else(|| ChainError::Decode("receipt.status missing".into()))?;
        let block_number = field("blockNumber").map(parse_quantity).transpose()?.unwrap_or(0);

        Ok(Self {
            tx_hash,
            success: status == 1,
            from,
            to: opt_address("to")?,
            contract_address: opt_address("contractAddress")?,
            block_number: u64::try_from(block_number)
                .map_err(|_| ChainError::Decode("receipt.blockNumber overflows u64".into()))?,
        })
    }
}

/// Parse a `0x` hex quantity.
pub fn parse_quantity(raw: &str) -> Result<u128, ChainError> {
    let body = raw.trim().trim_start_matches("0x");
    if body.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(body, 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity '{raw}': {e}")))
}

pub fn format_quantity(value: u128) -> String {
    format!("0x{value:x}")
}

fn quantity_u64<S: Serializer>(value: &u64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_quantity(u128::from(*value)))
}

fn quantity_u128<S: Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_quantity(*value))
}

fn hex_data<S: Serializer>(value: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("0x{}", hex::encode(value)))
}

fn prefixed_address<S: Serializer>(value: &WalletAddress, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&value.to_prefixed())
}

fn prefixed_opt_address<S: Serializer>(
    value: &Option<WalletAddress>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(address) => s.serialize_str(&address.to_prefixed()),
        None => s.serialize_none(),
    }
}
