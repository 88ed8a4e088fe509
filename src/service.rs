//! The operations exposed to the gateway, composed from the auth, role,
//! chain and privileged-operation components.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

use crate::auth::session::random_epoch;
use crate::auth::{ChallengeStore, SessionTokenService, signature};
use crate::chain::{ChainTxLifecycle, UnsignedTransaction};
use crate::config::AuthConfig;
use crate::db::{
    Database, NewUser, ReconcileReport, SystemStateStore, UserRecord, VoteRecord, state_keys,
};
use crate::error::{AuthError, DatabaseError, Error, PrivilegedError};
use crate::identity::{TxHash, WalletAddress};
use crate::privileged::{
    ConfirmOutcome, CoordinatorSettings, OperationKind, PrivilegedOperationCoordinator,
};
use crate::roles::{Role, RoleAuthority};

/// How far along a caller is, derived from an optional bearer token.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UserState {
    Unverified,
    Verified { wallet: WalletAddress },
    Registered { user: PublicUser },
}

/// A user as shown to other callers. Email is left out.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicUser {
    pub wallet: WalletAddress,
    pub display_name: String,
    pub role: String,
}

impl From<UserRecord> for PublicUser {
    fn from(user: UserRecord) -> Self {
        Self {
            wallet: user.wallet,
            display_name: user.display_name,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InitStatus {
    pub initialized: bool,
    pub root: Option<WalletAddress>,
    pub contract_address: Option<WalletAddress>,
}

/// One on-chain admin and what the role cache says about it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RosterEntry {
    pub wallet: WalletAddress,
    pub user: Option<PublicUser>,
    /// True when the cached role is admin or root.
    pub consistent: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AdminRoster {
    pub admins: Vec<RosterEntry>,
    /// Cached admins the contract does not list.
    pub stale_cached_admins: Vec<WalletAddress>,
}

impl AdminRoster {
    pub fn is_consistent(&self) -> bool {
        self.stale_cached_admins.is_empty() && self.admins.iter().all(|e| e.consistent)
    }
}

pub struct AuthorityService {
    db: Arc<dyn Database>,
    challenges: ChallengeStore,
    sessions: SessionTokenService,
    roles: Arc<RoleAuthority>,
    coordinator: PrivilegedOperationCoordinator,
}

impl AuthorityService {
    /// Run migrations, settle the session epoch and wire the components.
    pub async fn open(
        db: Arc<dyn Database>,
        chain: Arc<ChainTxLifecycle>,
        auth: &AuthConfig,
        settings: CoordinatorSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, Error> {
        db.run_migrations().await?;
        let epoch = resolve_epoch(db.as_ref(), auth.initial_epoch.as_deref()).await?;

        let roles = Arc::new(RoleAuthority::new(db.clone()));
        let coordinator = PrivilegedOperationCoordinator::new(
            db.clone(),
            roles.clone(),
            chain,
            settings,
            shutdown,
        );

        Ok(Self {
            db,
            challenges: ChallengeStore::new(auth.challenge_ttl),
            sessions: SessionTokenService::new(
                &auth.session_secret,
                auth.token_expiry_hours,
                epoch,
            ),
            roles,
            coordinator,
        })
    }

    pub fn roles(&self) -> &Arc<RoleAuthority> {
        &self.roles
    }

    pub fn sessions(&self) -> &SessionTokenService {
        &self.sessions
    }

    pub fn coordinator(&self) -> &PrivilegedOperationCoordinator {
        &self.coordinator
    }

    // ── Authentication ──────────────────────────────────────────────

    pub fn issue_challenge(&self, identity: &WalletAddress) -> String {
        let nonce = self.challenges.issue(identity);
        tracing::debug!(wallet = %identity, "Challenge issued");
        nonce
    }

    /// Consume the outstanding challenge, check the signature over it, and
    /// issue a session token.
    pub async fn verify_challenge_and_issue_session(
        &self,
        identity: &WalletAddress,
        signature_hex: &str,
    ) -> Result<String, Error> {
        let nonce = self.challenges.take(identity).inspect_err(|e| {
            tracing::warn!(wallet = %identity, error = %e, "Challenge verification failed");
        })?;
        signature::verify(&nonce, signature_hex, identity).inspect_err(|e| {
            tracing::warn!(wallet = %identity, error = %e, "Challenge verification failed");
        })?;
        let token = self.sessions.issue(identity).await?;
        tracing::info!(wallet = %identity, "Session issued");
        Ok(token)
    }

    pub async fn authenticate(&self, token: &str) -> Result<WalletAddress, Error> {
        self.sessions.verify(token).await.map_err(|e| {
            tracing::debug!(error = %e, "Session token rejected");
            Error::from(e)
        })
    }

    /// Token to wallet, then role containment. A void requirement needs only
    /// a valid token.
    pub async fn check_authorization(
        &self,
        token: &str,
        required: Role,
    ) -> Result<WalletAddress, Error> {
        let wallet = self.authenticate(token).await?;
        let allowed = self.roles.has_role(&wallet, required).await.inspect_err(|e| {
            tracing::warn!(wallet = %wallet, error = %e, "Role lookup failed");
        })?;
        if !allowed {
            tracing::warn!(wallet = %wallet, required = %required, "Authorization denied");
            return Err(AuthError::Forbidden {
                required: required.to_string(),
            }
            .into());
        }
        Ok(wallet)
    }

    pub fn purge_expired_challenges(&self) -> usize {
        let purged = self.challenges.purge_expired(Utc::now());
        if purged > 0 {
            tracing::debug!(purged, "Expired challenges purged");
        }
        purged
    }

    /// Replace the session epoch, persist it, and invalidate every token.
    pub async fn rotate_session_epoch(&self) -> Result<(), Error> {
        let next = random_epoch();
        self.db.set_state(state_keys::SESSION_EPOCH, &next).await?;
        self.sessions.set_epoch(next).await;
        tracing::info!("Session epoch rotated; outstanding tokens are now invalid");
        Ok(())
    }

    // ── Users ───────────────────────────────────────────────────────

    pub async fn register_user(
        &self,
        identity: &WalletAddress,
        email: &str,
        display_name: &str,
    ) -> Result<UserRecord, Error> {
        let email = email.trim();
        let display_name = display_name.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::InvalidInput(format!("'{email}' is not an email address")));
        }
        if display_name.is_empty() {
            return Err(Error::InvalidInput("display name must not be empty".into()));
        }

        let user = NewUser {
            wallet: identity.clone(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            role: Role::User,
        };
        match self.db.insert_user(&user).await {
            Ok(record) => {
                tracing::info!(wallet = %identity, "User registered");
                Ok(record)
            }
            Err(DatabaseError::Constraint(_)) => Err(Error::Conflict(
                "wallet or email is already registered".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn user_state(&self, token: Option<&str>) -> Result<UserState, Error> {
        let Some(token) = token else {
            return Ok(UserState::Unverified);
        };
        let wallet = match self.authenticate(token).await {
            Ok(wallet) => wallet,
            Err(Error::Auth(_)) => return Ok(UserState::Unverified),
            Err(e) => return Err(e),
        };
        match self.db.get_user(&wallet).await? {
            Some(user) => Ok(UserState::Registered { user: user.into() }),
            None => Ok(UserState::Verified { wallet }),
        }
    }

    pub async fn update_display_name(
        &self,
        identity: &WalletAddress,
        display_name: &str,
    ) -> Result<(), Error> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(Error::InvalidInput("display name must not be empty".into()));
        }
        if !self.db.update_display_name(identity, display_name).await? {
            return Err(DatabaseError::NotFound {
                entity: "user".to_string(),
                id: identity.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub async fn user_info(&self, identities: &[WalletAddress]) -> Result<Vec<PublicUser>, Error> {
        Ok(self
            .db
            .get_users(identities)
            .await?
            .into_iter()
            .map(PublicUser::from)
            .collect())
    }

    // ── Bootstrap and contract ──────────────────────────────────────

    pub async fn init_status(&self) -> Result<InitStatus, Error> {
        let root = self
            .db
            .get_state(state_keys::ROOT_IDENTITY)
            .await?
            .map(|raw| WalletAddress::parse(&raw))
            .transpose()?;
        Ok(InitStatus {
            initialized: root.is_some(),
            root,
            contract_address: self.coordinator.contract_address().await?,
        })
    }

    pub async fn nft_contract_address(&self) -> Result<Option<WalletAddress>, Error> {
        self.coordinator.contract_address().await
    }

    // ── Privileged operations ───────────────────────────────────────

    pub async fn build_privileged_tx(
        &self,
        kind: OperationKind,
        actor: &WalletAddress,
        target: &WalletAddress,
    ) -> Result<UnsignedTransaction, Error> {
        self.coordinator.build(kind, actor, target).await
    }

    pub async fn confirm_privileged_tx(
        &self,
        kind: OperationKind,
        target: &WalletAddress,
        tx_hash: &TxHash,
    ) -> Result<ConfirmOutcome, Error> {
        self.coordinator.confirm(kind, target, tx_hash).await
    }

    /// Broadcast a caller-signed transaction and return its hash.
    pub async fn relay_signed_transaction(&self, signed_hex: &str) -> Result<TxHash, Error> {
        let trimmed = signed_hex.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| Error::InvalidInput(format!("signed transaction is not hex: {e}")))?;
        if bytes.is_empty() {
            return Err(Error::InvalidInput("signed transaction is empty".into()));
        }
        self.coordinator.relay(&bytes).await
    }

    /// The on-chain admin set joined with the role cache.
    pub async fn get_admin_roster(&self) -> Result<AdminRoster, Error> {
        let contract = self.require_contract().await?;
        let on_chain = self
            .coordinator
            .chain()
            .admin_roster(self.coordinator.contract_name(), &contract)
            .await?;

        let mut admins = Vec::with_capacity(on_chain.len());
        for wallet in &on_chain {
            let user = self.db.get_user(wallet).await?;
            let consistent = user.as_ref().is_some_and(|u| {
                Role::parse_stored(&u.role).is_ok_and(|role| role.satisfies(Role::Admin))
            });
            admins.push(RosterEntry {
                wallet: wallet.clone(),
                user: user.map(PublicUser::from),
                consistent,
            });
        }

        let stale_cached_admins: Vec<WalletAddress> = self
            .db
            .list_users_with_role(Role::Admin.as_str())
            .await?
            .into_iter()
            .map(|u| u.wallet)
            .filter(|wallet| !on_chain.contains(wallet))
            .collect();

        let roster = AdminRoster {
            admins,
            stale_cached_admins,
        };
        if !roster.is_consistent() {
            tracing::warn!(
                on_chain = on_chain.len(),
                stale = roster.stale_cached_admins.len(),
                "Admin roster needs reconciliation"
            );
        }
        Ok(roster)
    }

    /// Mirror the on-chain admin set into the role cache.
    pub async fn reconcile_admin_roster(&self) -> Result<ReconcileReport, Error> {
        let contract = self.require_contract().await?;
        let on_chain = self
            .coordinator
            .chain()
            .admin_roster(self.coordinator.contract_name(), &contract)
            .await?;
        self.roles.reconcile_all(&on_chain).await
    }

    // ── Votes ───────────────────────────────────────────────────────

    /// Record a deployed vote contract owned by the calling admin.
    pub async fn create_vote(
        &self,
        owner: &WalletAddress,
        vote_address: &str,
    ) -> Result<VoteRecord, Error> {
        let contract = WalletAddress::parse(vote_address)?;
        match self.db.insert_vote(&contract, owner).await {
            Ok(record) => {
                tracing::info!(owner = %owner, contract = %contract, "Vote recorded");
                Ok(record)
            }
            Err(DatabaseError::Constraint(_)) => Err(Error::Conflict(format!(
                "vote contract {contract} is already recorded"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn vote(&self, contract: &WalletAddress) -> Result<Option<VoteRecord>, Error> {
        Ok(self.db.get_vote(contract).await?)
    }

    async fn require_contract(&self) -> Result<WalletAddress, Error> {
        self.coordinator.contract_address().await?.ok_or_else(|| {
            PrivilegedError::PreconditionNotMet("system is not initialized".to_string()).into()
        })
    }
}

/// Persisted epoch, else the configured one, else a fresh random value.
/// Whatever is chosen is persisted so restarts keep tokens valid.
pub async fn resolve_epoch(
    store: &dyn SystemStateStore,
    configured: Option<&str>,
) -> Result<String, Error> {
    if let Some(epoch) = store.get_state(state_keys::SESSION_EPOCH).await? {
        return Ok(epoch);
    }
    let epoch = configured
        .map(str::to_string)
        .unwrap_or_else(random_epoch);
    store.set_state(state_keys::SESSION_EPOCH, &epoch).await?;
    tracing::info!("Session epoch initialized");
    Ok(epoch)
}

/// Rotate the persisted epoch without a running server. Takes effect for a
/// running server on its next restart.
pub async fn rotate_persisted_epoch(store: &dyn SystemStateStore) -> Result<(), Error> {
    store
        .set_state(state_keys::SESSION_EPOCH, &random_epoch())
        .await?;
    tracing::info!("Persisted session epoch rotated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::libsql::LibSqlBackend;

    async fn store() -> (LibSqlBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LibSqlBackend::new_local(&dir.path().join("svc.db"))
            .await
            .unwrap();
        backend.run_migrations().await.unwrap();
        (backend, dir)
    }

    #[tokio::test]
    async fn persisted_epoch_wins_over_config() {
        let (backend, _dir) = store().await;
        backend
            .set_state(state_keys::SESSION_EPOCH, "persisted")
            .await
            .unwrap();
        assert_eq!(
            resolve_epoch(&backend, Some("configured")).await.unwrap(),
            "persisted"
        );
    }

    #[tokio::test]
    async fn configured_epoch_is_persisted() {
        let (backend, _dir) = store().await;
        assert_eq!(
            resolve_epoch(&backend, Some("configured")).await.unwrap(),
            "configured"
        );
        assert_eq!(
            backend.get_state(state_keys::SESSION_EPOCH).await.unwrap().as_deref(),
            Some("configured")
        );
    }

    #[tokio::test]
    async fn random_epoch_is_stable_across_restarts() {
        let (backend, _dir) = store().await;
        let first = resolve_epoch(&backend, None).await.unwrap();
        let second = resolve_epoch(&backend, None).await.unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(first, second);

        rotate_persisted_epoch(&backend).await.unwrap();
        assert_ne!(resolve_epoch(&backend, None).await.unwrap(), first);
    }

    #[test]
    fn roster_consistency_needs_every_entry() {
        let wallet = WalletAddress::parse(&"a".repeat(40)).unwrap();
        let mut roster = AdminRoster {
            admins: vec![RosterEntry {
                wallet: wallet.clone(),
                user: None,
                consistent: true,
            }],
            stale_cached_admins: vec![],
        };
        assert!(roster.is_consistent());

        roster.stale_cached_admins.push(wallet);
        assert!(!roster.is_consistent());
    }
}
