use std::sync::Arc;

use tokio::sync::RwLock;

use crate::db::UserStore;
pub use crate::db::ReconcileReport;
use crate::error::{DatabaseError, Error};
use crate::identity::WalletAddress;
use crate::roles::Role;

/// Cached role per wallet, mirrored from the on-chain admin set.
///
/// `reconcile_all` runs inside one store transaction and under the write side
/// of `guard`, so `has_role` never sees the demote-then-promote intermediate
/// state even on backends where readers are not isolated from the writer.
pub struct RoleAuthority {
    store: Arc<dyn UserStore>,
    guard: RwLock<()>,
}

impl RoleAuthority {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            guard: RwLock::new(()),
        }
    }

    /// The cached role for `identity`, or `Void` when there is no record.
    pub async fn role_of(&self, identity: &WalletAddress) -> Result<Role, Error> {
        let _read = self.guard.read().await;
        match self.store.get_role(identity).await? {
            Some(raw) => Ok(Role::parse_stored(&raw)?),
            None => Ok(Role::Void),
        }
    }

    pub async fn has_role(&self, identity: &WalletAddress, required: Role) -> Result<bool, Error> {
        if required == Role::Void {
            return Ok(true);
        }
        Ok(self.role_of(identity).await?.satisfies(required))
    }

    pub async fn set_role(&self, identity: &WalletAddress, role: Role) -> Result<(), Error> {
        let value = role.storage_value()?;
        let _write = self.guard.write().await;
        if !self.store.update_role(identity, value).await? {
            return Err(DatabaseError::NotFound {
                entity: "user".to_string(),
                id: identity.to_string(),
            }
            .into());
        }
        tracing::info!(wallet = %identity, role = %role, "Cached role updated");
        Ok(())
    }

    /// Demote every cached admin, then promote each listed wallet unless it is root.
    pub async fn reconcile_all(&self, admins: &[WalletAddress]) -> Result<ReconcileReport, Error> {
        let _write = self.guard.write().await;
        let report = self.store.reconcile_admins(admins).await?;
        if !report.unregistered.is_empty() {
            tracing::warn!(
                count = report.unregistered.len(),
                "On-chain admins without a user record were not cached"
            );
        }
        tracing::info!(
            demoted = report.demoted,
            promoted = report.promoted,
            root_kept = report.root_kept,
            "Admin roster reconciled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::libsql::LibSqlBackend;
    use crate::db::{Database, NewUser};

    fn wallet(n: u8) -> WalletAddress {
        WalletAddress::parse(&format!("0x{:040x}", n)).unwrap()
    }

    async fn authority_with(users: &[(u8, Role)]) -> (RoleAuthority, Arc<LibSqlBackend>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(LibSqlBackend::new_local(&dir.path().join("roles.db")).await.unwrap());
        backend.run_migrations().await.unwrap();
        for (n, role) in users {
            backend
                .insert_user(&NewUser {
                    wallet: wallet(*n),
                    email: format!("u{n}@example.com"),
                    display_name: format!("user {n}"),
                    role: *role,
                })
                .await
                .unwrap();
        }
        (RoleAuthority::new(backend.clone()), backend, dir)
    }

    #[tokio::test]
    async fn void_requirement_skips_lookup() {
        let (authority, _, _dir) = authority_with(&[]).await;
        assert!(authority.has_role(&wallet(9), Role::Void).await.unwrap());
        assert!(!authority.has_role(&wallet(9), Role::User).await.unwrap());
    }

    #[tokio::test]
    async fn containment_over_stored_roles() {
        let (authority, _, _dir) =
            authority_with(&[(1, Role::User), (2, Role::Admin), (3, Role::Root)]).await;

        assert!(authority.has_role(&wallet(1), Role::User).await.unwrap());
        assert!(!authority.has_role(&wallet(1), Role::Admin).await.unwrap());
        assert!(authority.has_role(&wallet(2), Role::User).await.unwrap());
        assert!(!authority.has_role(&wallet(2), Role::Root).await.unwrap());
        for required in [Role::Void, Role::User, Role::Admin, Role::Root] {
            assert!(authority.has_role(&wallet(3), required).await.unwrap());
        }
    }

    #[tokio::test]
    async fn corrupted_role_is_reported() {
        let (authority, backend, _dir) = authority_with(&[(1, Role::User)]).await;
        let conn = backend.connect().await.unwrap();
        conn.execute(
            "UPDATE users SET role = 'superuser' WHERE wallet = ?1",
            libsql::params![wallet(1).to_string()],
        )
        .await
        .unwrap();

        let err = authority.has_role(&wallet(1), Role::User).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Role(crate::error::RoleError::UnknownRole(_))
        ));
    }

    #[tokio::test]
    async fn set_role_rejects_void_and_missing_users() {
        let (authority, _, _dir) = authority_with(&[(1, Role::User)]).await;

        assert!(matches!(
            authority.set_role(&wallet(1), Role::Void).await,
            Err(Error::Role(crate::error::RoleError::VoidNotPersistable))
        ));
        assert!(matches!(
            authority.set_role(&wallet(7), Role::Admin).await,
            Err(Error::Database(DatabaseError::NotFound { .. }))
        ));

        authority.set_role(&wallet(1), Role::Admin).await.unwrap();
        assert_eq!(authority.role_of(&wallet(1)).await.unwrap(), Role::Admin);
    }

    #[tokio::test]
    async fn reconcile_mirrors_chain_and_protects_root() {
        let (authority, _, _dir) = authority_with(&[
            (1, Role::Admin),
            (2, Role::Admin),
            (3, Role::User),
            (4, Role::Root),
        ])
        .await;

        let listed = vec![wallet(2), wallet(3), wallet(4), wallet(8)];
        let report = authority.reconcile_all(&listed).await.unwrap();

        assert_eq!(report.demoted, 2);
        assert_eq!(report.promoted, 2);
        assert_eq!(report.root_kept, 1);
        assert_eq!(report.unregistered, vec![wallet(8)]);

        assert_eq!(authority.role_of(&wallet(1)).await.unwrap(), Role::User);
        assert_eq!(authority.role_of(&wallet(2)).await.unwrap(), Role::Admin);
        assert_eq!(authority.role_of(&wallet(3)).await.unwrap(), Role::Admin);
        assert_eq!(authority.role_of(&wallet(4)).await.unwrap(), Role::Root);
        assert_eq!(authority.role_of(&wallet(8)).await.unwrap(), Role::Void);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let (authority, _, _dir) =
            authority_with(&[(1, Role::Admin), (2, Role::User), (3, Role::Root)]).await;
        let listed = vec![wallet(2)];

        authority.reconcile_all(&listed).await.unwrap();
        let first: Vec<Role> = roles_of(&authority, 3).await;
        authority.reconcile_all(&listed).await.unwrap();
        let second: Vec<Role> = roles_of(&authority, 3).await;

        assert_eq!(first, second);
        assert_eq!(first, vec![Role::User, Role::Admin, Role::Root]);
    }

    #[tokio::test]
    async fn root_survives_empty_roster() {
        let (authority, _, _dir) = authority_with(&[(1, Role::Root), (2, Role::Admin)]).await;
        authority.reconcile_all(&[]).await.unwrap();

        assert_eq!(authority.role_of(&wallet(1)).await.unwrap(), Role::Root);
        assert_eq!(authority.role_of(&wallet(2)).await.unwrap(), Role::User);
    }

    async fn roles_of(authority: &RoleAuthority, count: u8) -> Vec<Role> {
        let mut roles = Vec::new();
        for n in 1..=count {
            roles.push(authority.role_of(&wallet(n)).await.unwrap());
        }
        roles
    }
}
