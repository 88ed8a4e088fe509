use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::chain::{AdminCall, ChainTxLifecycle, TransactionReceipt, UnsignedTransaction};
use crate::db::{Database, NewUser, state_keys};
use crate::error::{Error, PrivilegedError};
use crate::identity::{TxHash, WalletAddress};
use crate::privileged::{OperationKind, OperationRecord, OperationState};
use crate::roles::{Role, RoleAuthority};

/// Fixed inputs for building and confirming privileged operations.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Artifact name of the voting NFT contract.
    pub contract_name: String,
    /// Email stored on the root user created by bootstrap.
    pub root_email: String,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
}

/// Result of a successful confirmation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub kind: OperationKind,
    pub target: WalletAddress,
    pub tx_hash: TxHash,
    /// Set for bootstrap: the freshly deployed contract.
    pub contract_address: Option<WalletAddress>,
    /// True when this hash had already been applied.
    pub already_applied: bool,
}

enum Precondition {
    Met { contract: Option<WalletAddress> },
    Failed(String),
}

/// Drives `Requested → TxBuilt → AwaitingConfirmation → Confirmed →
/// CacheUpdated` (or `Rejected`) for bootstrap and admin add/remove.
///
/// The server never signs. `build` hands back an unsigned transaction and
/// touches no cached role; `confirm` waits for the caller's broadcast to be
/// mined, checks the chain agrees, and only then mutates the cache. Progress
/// is persisted per `(kind, target)` so a confirmation after a restart
/// re-reads chain state instead of trusting request order.
pub struct PrivilegedOperationCoordinator {
    db: Arc<dyn Database>,
    roles: Arc<RoleAuthority>,
    chain: Arc<ChainTxLifecycle>,
    settings: CoordinatorSettings,
    shutdown: watch::Receiver<bool>,
}

impl PrivilegedOperationCoordinator {
    pub fn new(
        db: Arc<dyn Database>,
        roles: Arc<RoleAuthority>,
        chain: Arc<ChainTxLifecycle>,
        settings: CoordinatorSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            roles,
            chain,
            settings,
            shutdown,
        }
    }

    pub fn chain(&self) -> &Arc<ChainTxLifecycle> {
        &self.chain
    }

    pub fn contract_name(&self) -> &str {
        &self.settings.contract_name
    }

    pub async fn contract_address(&self) -> Result<Option<WalletAddress>, Error> {
        match self.db.get_state(state_keys::CONTRACT_ADDRESS).await? {
            Some(raw) => Ok(Some(WalletAddress::parse(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn is_initialized(&self) -> Result<bool, Error> {
        Ok(self.db.get_state(state_keys::ROOT_IDENTITY).await?.is_some())
    }

    /// Gen phase: validate, build the unsigned transaction, record `TxBuilt`.
    pub async fn build(
        &self,
        kind: OperationKind,
        actor: &WalletAddress,
        target: &WalletAddress,
    ) -> Result<UnsignedTransaction, Error> {
        let mut record = OperationRecord::requested(kind, target.clone(), Some(actor.clone()));

        let contract = match self.precondition(kind, actor, target).await? {
            Precondition::Met { contract } => contract,
            Precondition::Failed(reason) => {
                return Err(self.reject(&mut record, PrivilegedError::PreconditionNotMet(reason)).await);
            }
        };

        let built = match (kind, contract) {
            (OperationKind::Bootstrap, _) => {
                // The voting NFT constructor takes no arguments.
                self.chain
                    .build_deployment(&self.settings.contract_name, actor, &[])
                    .await
            }
            (OperationKind::AddAdmin, Some(contract)) => {
                self.chain
                    .build_call(
                        &self.settings.contract_name,
                        actor,
                        &contract,
                        &AdminCall::AddAdmin(target.clone()),
                    )
                    .await
            }
            (OperationKind::RemoveAdmin, Some(contract)) => {
                self.chain
                    .build_call(
                        &self.settings.contract_name,
                        actor,
                        &contract,
                        &AdminCall::RemoveAdmin(target.clone()),
                    )
                    .await
            }
            (_, None) => {
                return Err(self
                    .reject(
                        &mut record,
                        PrivilegedError::PreconditionNotMet("no contract address recorded".into()),
                    )
                    .await);
            }
        };

        let tx = match built {
            Ok(tx) => tx,
            Err(e) if e.is_availability() => return Err(e.into()),
            Err(e) => return Err(self.reject(&mut record, e).await),
        };

        record.advance(OperationState::TxBuilt)?;
        self.db.save_operation(&record).await?;
        tracing::info!(kind = %kind, actor = %actor, target = %target, "Privileged transaction built");
        Ok(tx)
    }

    /// Exec phase: wait for `tx_hash`, check the receipt and chain state,
    /// then apply the cached side effect.
    ///
    /// Availability failures leave the record where it was so the caller can
    /// retry with the same hash. Confirming an already applied hash is a no-op.
    pub async fn confirm(
        &self,
        kind: OperationKind,
        target: &WalletAddress,
        tx_hash: &TxHash,
    ) -> Result<ConfirmOutcome, Error> {
        let existing = self.db.get_operation(kind, target).await?;
        if let Some(done) = &existing
            && done.state == OperationState::CacheUpdated
            && done.tx_hash.as_ref() == Some(tx_hash)
        {
            return Ok(ConfirmOutcome {
                kind,
                target: target.clone(),
                tx_hash: tx_hash.clone(),
                contract_address: match kind {
                    OperationKind::Bootstrap => self.contract_address().await?,
                    _ => None,
                },
                already_applied: true,
            });
        }

        let mut record = match existing {
            Some(record)
                if matches!(
                    record.state,
                    OperationState::TxBuilt
                        | OperationState::AwaitingConfirmation
                        | OperationState::Confirmed
                ) =>
            {
                record
            }
            // No usable build record, e.g. after a crash between phases.
            _ => {
                let mut fresh = OperationRecord::requested(kind, target.clone(), None);
                fresh.advance(OperationState::TxBuilt)?;
                fresh
            }
        };

        let contract = match kind {
            OperationKind::Bootstrap => {
                if self.is_initialized().await? {
                    return Err(self
                        .reject(
                            &mut record,
                            PrivilegedError::PreconditionNotMet("system is already initialized".into()),
                        )
                        .await);
                }
                None
            }
            OperationKind::AddAdmin | OperationKind::RemoveAdmin => {
                match self.contract_address().await? {
                    Some(contract) => Some(contract),
                    None => {
                        return Err(self
                            .reject(
                                &mut record,
                                PrivilegedError::PreconditionNotMet(
                                    "system is not initialized".into(),
                                ),
                            )
                            .await);
                    }
                }
            }
        };

        record.tx_hash = Some(tx_hash.clone());
        record.advance(OperationState::AwaitingConfirmation)?;
        self.db.save_operation(&record).await?;

        let receipt = match self
            .chain
            .await_receipt(
                tx_hash,
                self.settings.receipt_poll_interval,
                self.settings.receipt_timeout,
                self.shutdown.clone(),
            )
            .await
        {
            Ok(receipt) => receipt,
            Err(e) if e.is_availability() => {
                tracing::warn!(kind = %kind, target = %target, tx = %tx_hash, error = %e,
                    "Confirmation not observed; operation left awaiting confirmation");
                return Err(e.into());
            }
            Err(e) => return Err(self.reject(&mut record, e).await),
        };

        if let Err(mismatch) = check_receipt(kind, target, tx_hash, contract.as_ref(), &receipt) {
            return Err(self.reject(&mut record, mismatch).await);
        }
        record.advance(OperationState::Confirmed)?;
        self.db.save_operation(&record).await?;

        let contract_address = match kind {
            OperationKind::Bootstrap => {
                // check_receipt guarantees a contract address for bootstrap.
                let deployed = receipt.contract_address.clone().ok_or_else(|| {
                    PrivilegedError::ReceiptMismatch("deployment receipt has no contract address".into())
                })?;
                match self.apply_bootstrap(target, &deployed).await {
                    Ok(true) => {}
                    // Another deployer's confirmation got there first.
                    Ok(false) => {
                        return Err(self
                            .reject(
                                &mut record,
                                PrivilegedError::PreconditionNotMet(
                                    "system is already initialized".into(),
                                ),
                            )
                            .await);
                    }
                    Err(e) => return Err(self.stall(&mut record, e).await),
                }
                Some(deployed)
            }
            OperationKind::AddAdmin | OperationKind::RemoveAdmin => {
                let contract = contract.ok_or_else(|| {
                    PrivilegedError::PreconditionNotMet("system is not initialized".into())
                })?;
                self.apply_admin_change(kind, target, &contract, &mut record)
                    .await?;
                None
            }
        };

        record.advance(OperationState::CacheUpdated)?;
        record.detail = None;
        self.db.save_operation(&record).await?;
        tracing::info!(kind = %kind, target = %target, tx = %tx_hash, "Privileged operation applied");

        Ok(ConfirmOutcome {
            kind,
            target: target.clone(),
            tx_hash: tx_hash.clone(),
            contract_address,
            already_applied: false,
        })
    }

    /// Broadcast a transaction the caller already signed.
    pub async fn relay(&self, signed: &[u8]) -> Result<TxHash, Error> {
        let hash = self.chain.rpc().send_raw_transaction(signed).await?;
        tracing::info!(tx = %hash, "Relayed signed transaction");
        Ok(hash)
    }

    pub async fn operation(
        &self,
        kind: OperationKind,
        target: &WalletAddress,
    ) -> Result<Option<OperationRecord>, Error> {
        Ok(self.db.get_operation(kind, target).await?)
    }

    async fn precondition(
        &self,
        kind: OperationKind,
        actor: &WalletAddress,
        target: &WalletAddress,
    ) -> Result<Precondition, Error> {
        let initialized = self.is_initialized().await?;
        match kind {
            OperationKind::Bootstrap => {
                if initialized {
                    return Ok(Precondition::Failed("system is already initialized".into()));
                }
                if actor != target {
                    return Ok(Precondition::Failed(
                        "the bootstrap deployer must be the caller".into(),
                    ));
                }
                Ok(Precondition::Met { contract: None })
            }
            OperationKind::AddAdmin | OperationKind::RemoveAdmin => {
                if !initialized {
                    return Ok(Precondition::Failed("system is not initialized".into()));
                }
                let Some(contract) = self.contract_address().await? else {
                    return Ok(Precondition::Failed("no contract address recorded".into()));
                };
                match self.db.get_user(target).await? {
                    None => Ok(Precondition::Failed(format!("{target} is not a registered user"))),
                    Some(user) if user.role == Role::Root.as_str() => {
                        Ok(Precondition::Failed("the root role cannot be changed".into()))
                    }
                    Some(_) => Ok(Precondition::Met {
                        contract: Some(contract),
                    }),
                }
            }
        }
    }

    async fn apply_bootstrap(
        &self,
        deployer: &WalletAddress,
        contract: &WalletAddress,
    ) -> Result<bool, Error> {
        self.db.run_migrations().await?;
        let root = NewUser {
            wallet: deployer.clone(),
            email: self.settings.root_email.clone(),
            display_name: "root".to_string(),
            role: Role::Root,
        };
        if !self.db.complete_bootstrap(&root, contract).await? {
            return Ok(false);
        }
        tracing::info!(root = %deployer, contract = %contract, "Bootstrap complete");
        Ok(true)
    }

    async fn apply_admin_change(
        &self,
        kind: OperationKind,
        target: &WalletAddress,
        contract: &WalletAddress,
        record: &mut OperationRecord,
    ) -> Result<(), Error> {
        let expected = kind == OperationKind::AddAdmin;
        let on_chain = self
            .chain
            .is_administrator(&self.settings.contract_name, contract, target)
            .await?;

        if on_chain != expected {
            tracing::error!(
                kind = %kind,
                target = %target,
                expected,
                on_chain,
                "Chain and role cache diverged; cache left untouched"
            );
            return Err(self
                .reject(
                    record,
                    PrivilegedError::ChainCacheDivergence {
                        target: target.to_string(),
                        expected,
                    },
                )
                .await);
        }

        if self.roles.role_of(target).await? == Role::Root {
            tracing::info!(target = %target, "Target is root; cached role kept");
            return Ok(());
        }
        let role = if expected { Role::Admin } else { Role::User };
        if let Err(e) = self.roles.set_role(target, role).await {
            return Err(self.reject(record, e).await);
        }
        Ok(())
    }

    /// Keep a confirmed record retryable but note why applying it failed.
    async fn stall(&self, record: &mut OperationRecord, err: impl Into<Error>) -> Error {
        let err = err.into();
        record.detail = Some(err.to_string());
        tracing::error!(
            kind = %record.kind,
            target = %record.target,
            state = %record.state,
            reason = %err,
            "Confirmed operation could not be applied"
        );
        if let Err(e) = self.db.save_operation(record).await {
            tracing::error!("Failed to persist stalled operation: {}", e);
        }
        err
    }

    /// Persist a `Rejected` record and hand the error back.
    async fn reject(&self, record: &mut OperationRecord, err: impl Into<Error>) -> Error {
        let err = err.into();
        record.reject(err.to_string());
        tracing::warn!(
            kind = %record.kind,
            target = %record.target,
            reason = %err,
            "Privileged operation rejected"
        );
        if let Err(e) = self.db.save_operation(record).await {
            tracing::error!("Failed to persist rejected operation: {}", e);
        }
        err
    }
}

fn check_receipt(
    kind: OperationKind,
    target: &WalletAddress,
    tx_hash: &TxHash,
    contract: Option<&WalletAddress>,
    receipt: &TransactionReceipt,
) -> Result<(), PrivilegedError> {
    if &receipt.tx_hash != tx_hash {
        return Err(PrivilegedError::ReceiptMismatch(format!(
            "receipt is for {} not {tx_hash}",
            receipt.tx_hash
        )));
    }
    match kind {
        OperationKind::Bootstrap => {
            if receipt.contract_address.is_none() {
                return Err(PrivilegedError::ReceiptMismatch(
                    "transaction did not create a contract".into(),
                ));
            }
            if &receipt.from != target {
                return Err(PrivilegedError::ReceiptMismatch(format!(
                    "deployed by {} not {target}",
                    receipt.from
                )));
            }
        }
        OperationKind::AddAdmin | OperationKind::RemoveAdmin => {
            if receipt.to.as_ref() != contract {
                return Err(PrivilegedError::ReceiptMismatch(
                    "transaction was not sent to the voting contract".into(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(c: char) -> WalletAddress {
        WalletAddress::parse(&c.to_string().repeat(40)).unwrap()
    }

    fn receipt(from: char, to: Option<char>, created: Option<char>) -> TransactionReceipt {
        TransactionReceipt {
            tx_hash: TxHash::parse(&"1".repeat(64)).unwrap(),
            success: true,
            from: wallet(from),
            to: to.map(wallet),
            contract_address: created.map(wallet),
            block_number: 1,
        }
    }

    #[test]
    fn bootstrap_receipt_must_create_contract_from_deployer() {
        let hash = TxHash::parse(&"1".repeat(64)).unwrap();
        let target = wallet('a');

        let check = |r: TransactionReceipt| {
            check_receipt(OperationKind::Bootstrap, &target, &hash, None, &r)
        };

        assert!(check(receipt('a', None, Some('c'))).is_ok());
        assert!(check(receipt('a', None, None)).is_err());
        assert!(check(receipt('b', None, Some('c'))).is_err());
    }

    #[test]
    fn admin_receipt_must_target_contract() {
        let hash = TxHash::parse(&"1".repeat(64)).unwrap();
        let contract = wallet('c');
        let target = wallet('b');

        let check = |kind, hash: &TxHash, r: TransactionReceipt| {
            check_receipt(kind, &target, hash, Some(&contract), &r)
        };

        assert!(check(OperationKind::AddAdmin, &hash, receipt('a', Some('c'), None)).is_ok());
        assert!(matches!(
            check(OperationKind::RemoveAdmin, &hash, receipt('a', Some('d'), None)),
            Err(PrivilegedError::ReceiptMismatch(_))
        ));

        let other_hash = TxHash::parse(&"2".repeat(64)).unwrap();
        assert!(check(OperationKind::AddAdmin, &other_hash, receipt('a', Some('c'), None)).is_err());
    }
}
