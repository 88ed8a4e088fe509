//! Ethereum JSON-RPC collaborator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use crate::chain::types::{CallRequest, TransactionReceipt, parse_quantity};
use crate::error::ChainError;
use crate::identity::{TxHash, WalletAddress};

/// The chain operations this service needs.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn pending_nonce(&self, address: &WalletAddress) -> Result<u64, ChainError>;

    async fn suggest_gas_price(&self) -> Result<u128, ChainError>;

    /// Fails with `GasEstimationFailed` when the simulation reverts.
    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, ChainError>;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn send_raw_transaction(&self, signed: &[u8]) -> Result<TxHash, ChainError>;

    /// `Ok(None)` means the transaction is not mined yet.
    async fn get_receipt(&self, hash: &TxHash) -> Result<Option<TransactionReceipt>, ChainError>;

    /// Read-only simulation against the latest block.
    async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, ChainError>;
}

/// `ChainRpc` over HTTP JSON-RPC.
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Validate the endpoint and build the HTTP client. No request is made.
    pub fn dial(endpoint: &str, timeout: Duration) -> Result<Self, ChainError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ChainError::Unavailable(format!("invalid RPC URL '{endpoint}': {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ChainError::Unavailable(format!(
                "RPC URL must be http(s), got '{}'",
                endpoint.scheme()
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": id });
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{method}: {e}")))?;
        if !response.status().is_success() {
            return Err(ChainError::Unavailable(format!(
                "{method}: HTTP {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{method}: {e}")))?;
        parse_rpc_response(body)
    }

    async fn request_quantity(&self, method: &str, params: Value) -> Result<u128, ChainError> {
        let result = self.request(method, params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::Decode(format!("{method}: expected hex quantity")))?;
        parse_quantity(raw)
    }
}

/// Split a JSON-RPC envelope into its result or error.
pub(crate) fn parse_rpc_response(body: Value) -> Result<Value, ChainError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(ChainError::Rpc { code, message });
    }
    match body.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(ChainError::Decode("response has neither result nor error".into())),
    }
}

fn to_u64(value: u128, what: &str) -> Result<u64, ChainError> {
    u64::try_from(value).map_err(|_| ChainError::Decode(format!("{what} overflows u64")))
}

#[async_trait]
impl ChainRpc for JsonRpcClient {
    async fn pending_nonce(&self, address: &WalletAddress) -> Result<u64, ChainError> {
        let nonce = self
            .request_quantity(
                "eth_getTransactionCount",
                json!([address.to_prefixed(), "pending"]),
            )
            .await?;
        to_u64(nonce, "nonce")
    }

    async fn suggest_gas_price(&self) -> Result<u128, ChainError> {
        self.request_quantity("eth_gasPrice", json!([])).await
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, ChainError> {
        match self
            .request_quantity("eth_estimateGas", json!([call.to_json()]))
            .await
        {
            Ok(gas) => to_u64(gas, "gas"),
            Err(ChainError::Rpc { message, .. }) => Err(ChainError::GasEstimationFailed(message)),
            Err(e) => Err(e),
        }
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self.request_quantity("eth_chainId", json!([])).await?;
        to_u64(id, "chain id")
    }

    async fn send_raw_transaction(&self, signed: &[u8]) -> Result<TxHash, ChainError> {
        let result = self
            .request(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(signed))]),
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::Decode("eth_sendRawTransaction: expected hash".into()))?;
        TxHash::parse(raw).map_err(|e| ChainError::Decode(e.to_string()))
    }

    async fn get_receipt(&self, hash: &TxHash) -> Result<Option<TransactionReceipt>, ChainError> {
        let result = self
            .request("eth_getTransactionReceipt", json!([hash.to_prefixed()]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        TransactionReceipt::from_json(&result).map(Some)
    }

    async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, ChainError> {
        let result = self
            .request("eth_call", json!([call.to_json(), "latest"]))
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::Decode("eth_call: expected hex data".into()))?;
        hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| ChainError::Decode(format!("eth_call: {e}")))
    }
}
