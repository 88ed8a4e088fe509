//! Building unsigned transactions and waiting for their receipts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::chain::artifact::ArtifactSource;
use crate::chain::contract::{AdminCall, decode_address_list, decode_bool};
use crate::chain::rpc::ChainRpc;
use crate::chain::types::{CallRequest, TransactionReceipt, UnsignedTransaction};
use crate::error::ChainError;
use crate::identity::{TxHash, WalletAddress};

/// Gas limit used for contract creation when none is configured.
pub const DEFAULT_DEPLOYMENT_GAS_LIMIT: u64 = 5_000_000;

pub struct ChainTxLifecycle {
    rpc: Arc<dyn ChainRpc>,
    artifacts: Arc<dyn ArtifactSource>,
    deployment_gas_limit: u64,
}

impl ChainTxLifecycle {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        artifacts: Arc<dyn ArtifactSource>,
        deployment_gas_limit: u64,
    ) -> Self {
        Self {
            rpc,
            artifacts,
            deployment_gas_limit,
        }
    }

    pub fn rpc(&self) -> &Arc<dyn ChainRpc> {
        &self.rpc
    }

    /// Contract creation: bytecode followed by the encoded constructor
    /// arguments, with a fixed gas limit.
    pub async fn build_deployment(
        &self,
        contract_name: &str,
        from: &WalletAddress,
        constructor_args: &[u8],
    ) -> Result<UnsignedTransaction, ChainError> {
        let artifact = self.artifacts.load(contract_name).await?;
        let mut input = artifact.bytecode;
        input.extend_from_slice(constructor_args);

        let (nonce, gas_price, chain_id) = tokio::try_join!(
            self.rpc.pending_nonce(from),
            self.rpc.suggest_gas_price(),
            self.rpc.chain_id(),
        )?;

        tracing::info!(
            contract = contract_name,
            from = %from,
            nonce,
            "Built deployment transaction"
        );
        Ok(UnsignedTransaction {
            from: from.clone(),
            to: None,
            nonce,
            gas: self.deployment_gas_limit,
            gas_price,
            value: 0,
            input,
            chain_id,
        })
    }

    /// Contract call with gas estimated against current chain state. A
    /// simulated revert surfaces as `GasEstimationFailed`.
    pub async fn build_call(
        &self,
        contract_name: &str,
        from: &WalletAddress,
        contract: &WalletAddress,
        call: &AdminCall,
    ) -> Result<UnsignedTransaction, ChainError> {
        let input = self.encode_checked(contract_name, call).await?;
        let request = CallRequest {
            from: Some(from.clone()),
            to: Some(contract.clone()),
            data: input.clone(),
        };

        let gas = self.rpc.estimate_gas(&request).await?;
        let (nonce, gas_price, chain_id) = tokio::try_join!(
            self.rpc.pending_nonce(from),
            self.rpc.suggest_gas_price(),
            self.rpc.chain_id(),
        )?;

        tracing::info!(
            method = call.method_name(),
            from = %from,
            contract = %contract,
            gas,
            "Built contract call transaction"
        );
        Ok(UnsignedTransaction {
            from: from.clone(),
            to: Some(contract.clone()),
            nonce,
            gas,
            gas_price,
            value: 0,
            input,
            chain_id,
        })
    }

    /// Simulate a view call and return the raw return data.
    pub async fn call_read_only(
        &self,
        contract_name: &str,
        contract: &WalletAddress,
        call: &AdminCall,
    ) -> Result<Vec<u8>, ChainError> {
        let data = self.encode_checked(contract_name, call).await?;
        self.rpc
            .call(&CallRequest {
                from: None,
                to: Some(contract.clone()),
                data,
            })
            .await
    }

    pub async fn is_administrator(
        &self,
        contract_name: &str,
        contract: &WalletAddress,
        wallet: &WalletAddress,
    ) -> Result<bool, ChainError> {
        let raw = self
            .call_read_only(
                contract_name,
                contract,
                &AdminCall::IsAdministrator(wallet.clone()),
            )
            .await?;
        decode_bool(&raw)
    }

    /// The authoritative admin set.
    pub async fn admin_roster(
        &self,
        contract_name: &str,
        contract: &WalletAddress,
    ) -> Result<Vec<WalletAddress>, ChainError> {
        let raw = self
            .call_read_only(contract_name, contract, &AdminCall::GetAllAdmins)
            .await?;
        decode_address_list(&raw)
    }

    /// Poll for the receipt of `tx_hash` until it is mined, `timeout`
    /// elapses, or `shutdown` flips to true.
    ///
    /// "Not yet mined" is retried; any other RPC failure ends the wait with
    /// `ReceiptFetchFailed`. A mined receipt with failed status is `Reverted`.
    pub async fn await_receipt(
        &self,
        tx_hash: &TxHash,
        poll_interval: Duration,
        timeout: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<TransactionReceipt, ChainError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut signal_open = true;

        loop {
            if *shutdown.borrow() {
                tracing::info!(tx = %tx_hash, "Receipt wait cancelled by shutdown");
                return Err(ChainError::Cancelled {
                    tx_hash: tx_hash.to_string(),
                });
            }

            match self.rpc.get_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.success => {
                    tracing::info!(
                        tx = %tx_hash,
                        block = receipt.block_number,
                        "Transaction confirmed"
                    );
                    return Ok(receipt);
                }
                Ok(Some(_)) => {
                    tracing::warn!(tx = %tx_hash, "Transaction reverted on-chain");
                    return Err(ChainError::Reverted {
                        tx_hash: tx_hash.to_string(),
                    });
                }
                Ok(None) => {
                    tracing::debug!(tx = %tx_hash, "Receipt not available yet");
                }
                Err(e) => return Err(ChainError::ReceiptFetchFailed(e.to_string())),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ChainError::Timeout {
                    tx_hash: tx_hash.to_string(),
                    waited_secs: now.duration_since(started).as_secs(),
                });
            }
            let pause = poll_interval.min(deadline - now);

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed(), if signal_open => {
                    // A dropped sender means nobody can cancel us any more.
                    if changed.is_err() {
                        signal_open = false;
                    }
                }
            }
        }
    }

    async fn encode_checked(
        &self,
        contract_name: &str,
        call: &AdminCall,
    ) -> Result<Vec<u8>, ChainError> {
        let artifact = self.artifacts.load(contract_name).await?;
        if !artifact.has_function(call.method_name()) {
            return Err(ChainError::Encoding(format!(
                "{} does not declare {}",
                contract_name,
                call.signature()
            )));
        }
        Ok(call.encode())
    }
}
