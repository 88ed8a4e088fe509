//! Persistence traits and the libSQL backend.
//!
//! The service talks to storage only through these traits. `LibSqlBackend`
//! implements all of them over one embedded database.

pub mod libsql;
pub(crate) mod libsql_migrations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::identity::WalletAddress;
use crate::privileged::{OperationKind, OperationRecord};
use crate::roles::Role;

/// Keys in the `system_state` table.
pub mod state_keys {
    pub const ROOT_IDENTITY: &str = "root_identity";
    pub const CONTRACT_ADDRESS: &str = "nft_contract_address";
    pub const SESSION_EPOCH: &str = "session_epoch";
}

/// A user row. `role` is the raw stored value; parse it with `Role::parse_stored`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub wallet: WalletAddress,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub wallet: WalletAddress,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// Outcome of one demote-then-promote pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub demoted: u64,
    pub promoted: u64,
    pub root_kept: u64,
    /// Listed on-chain but with no user record, so nothing to cache.
    pub unregistered: Vec<WalletAddress>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DatabaseError::Constraint` when the wallet or email exists.
    async fn insert_user(&self, user: &NewUser) -> Result<UserRecord, DatabaseError>;

    async fn get_user(&self, wallet: &WalletAddress) -> Result<Option<UserRecord>, DatabaseError>;

    async fn get_users(&self, wallets: &[WalletAddress]) -> Result<Vec<UserRecord>, DatabaseError>;

    async fn get_role(&self, wallet: &WalletAddress) -> Result<Option<String>, DatabaseError>;

    /// Returns false when no row matched.
    async fn update_role(&self, wallet: &WalletAddress, role: &str) -> Result<bool, DatabaseError>;

    async fn update_display_name(
        &self,
        wallet: &WalletAddress,
        display_name: &str,
    ) -> Result<bool, DatabaseError>;

    async fn list_users_with_role(&self, role: &str) -> Result<Vec<UserRecord>, DatabaseError>;

    /// In one transaction: every `admin` becomes `user`, then every listed
    /// wallet that is not `root` becomes `admin`.
    async fn reconcile_admins(
        &self,
        admins: &[WalletAddress],
    ) -> Result<ReconcileReport, DatabaseError>;
}

#[async_trait]
pub trait SystemStateStore: Send + Sync {
    async fn get_state(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    async fn set_state(&self, key: &str, value: &str) -> Result<(), DatabaseError>;

    /// Insert (or promote) the root user and record the root identity and
    /// contract address, all in one transaction.
    ///
    /// Returns false and writes nothing when a root identity is already
    /// recorded.
    async fn complete_bootstrap(
        &self,
        root: &NewUser,
        contract_address: &WalletAddress,
    ) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn get_operation(
        &self,
        kind: OperationKind,
        target: &WalletAddress,
    ) -> Result<Option<OperationRecord>, DatabaseError>;

    async fn save_operation(&self, record: &OperationRecord) -> Result<(), DatabaseError>;
}

/// A vote contract an admin registered, keyed by its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteRecord {
    pub contract_address: WalletAddress,
    pub owner: WalletAddress,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Fails with `DatabaseError::Constraint` when the contract is already recorded.
    async fn insert_vote(
        &self,
        contract_address: &WalletAddress,
        owner: &WalletAddress,
    ) -> Result<VoteRecord, DatabaseError>;

    async fn get_vote(
        &self,
        contract_address: &WalletAddress,
    ) -> Result<Option<VoteRecord>, DatabaseError>;
}

#[async_trait]
pub trait Database:
    UserStore + SystemStateStore + OperationStore + VoteStore + Send + Sync
{
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}
