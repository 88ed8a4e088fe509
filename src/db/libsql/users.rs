//! UserStore implementation for LibSqlBackend.

use async_trait::async_trait;
use chrono::Utc;

use super::{LibSqlBackend, classify_write_error, fmt_ts, get_text, get_ts};
use crate::db::{NewUser, ReconcileReport, UserRecord, UserStore};
use crate::error::DatabaseError;
use crate::identity::WalletAddress;

const USER_COLUMNS: &str = "wallet, email, display_name, role, created_at";

fn row_to_user(row: &libsql::Row) -> Result<UserRecord, DatabaseError> {
    let wallet = WalletAddress::parse(&get_text(row, 0))
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    Ok(UserRecord {
        wallet,
        email: get_text(row, 1),
        display_name: get_text(row, 2),
        role: get_text(row, 3),
        created_at: get_ts(row, 4)?,
    })
}

#[async_trait]
impl UserStore for LibSqlBackend {
    async fn insert_user(&self, user: &NewUser) -> Result<UserRecord, DatabaseError> {
        let role = user
            .role
            .storage_value()
            .map_err(|e| DatabaseError::Constraint(e.to_string()))?;
        let created_at = Utc::now();
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO users (wallet, email, display_name, role, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            libsql::params![
                user.wallet.as_str(),
                user.email.as_str(),
                user.display_name.as_str(),
                role,
                fmt_ts(&created_at),
            ],
        )
        .await
        .map_err(classify_write_error)?;

        Ok(UserRecord {
            wallet: user.wallet.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: role.to_string(),
            created_at,
        })
    }

    async fn get_user(&self, wallet: &WalletAddress) -> Result<Option<UserRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE wallet = ?1"),
                libsql::params![wallet.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_users(&self, wallets: &[WalletAddress]) -> Result<Vec<UserRecord>, DatabaseError> {
        let mut users = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            if let Some(user) = self.get_user(wallet).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn get_role(&self, wallet: &WalletAddress) -> Result<Option<String>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT role FROM users WHERE wallet = ?1",
                libsql::params![wallet.as_str()],
            )
            .await?;
        Ok(rows.next().await?.map(|row| get_text(&row, 0)))
    }

    async fn update_role(&self, wallet: &WalletAddress, role: &str) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let changed = conn
            .execute(
                "UPDATE users SET role = ?2 WHERE wallet = ?1",
                libsql::params![wallet.as_str(), role],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn update_display_name(
        &self,
        wallet: &WalletAddress,
        display_name: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let changed = conn
            .execute(
                "UPDATE users SET display_name = ?2 WHERE wallet = ?1",
                libsql::params![wallet.as_str(), display_name],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn list_users_with_role(&self, role: &str) -> Result<Vec<UserRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE role = ?1 ORDER BY created_at"),
                libsql::params![role],
            )
            .await?;
        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }

    async fn reconcile_admins(
        &self,
        admins: &[WalletAddress],
    ) -> Result<ReconcileReport, DatabaseError> {
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;

        let mut report = ReconcileReport {
            demoted: tx
                .execute("UPDATE users SET role = 'user' WHERE role = 'admin'", ())
                .await?,
            ..ReconcileReport::default()
        };

        for wallet in admins {
            let mut rows = tx
                .query(
                    "SELECT role FROM users WHERE wallet = ?1",
                    libsql::params![wallet.as_str()],
                )
                .await?;
            let current = rows.next().await?.map(|row| get_text(&row, 0));
            drop(rows);
            match current.as_deref() {
                None => report.unregistered.push(wallet.clone()),
                Some("root") => report.root_kept += 1,
                Some(_) => {
                    report.promoted += tx
                        .execute(
                            "UPDATE users SET role = 'admin' WHERE wallet = ?1 AND role != 'root'",
                            libsql::params![wallet.as_str()],
                        )
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}
