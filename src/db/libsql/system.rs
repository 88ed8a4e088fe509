//! SystemStateStore implementation for LibSqlBackend.

use async_trait::async_trait;
use chrono::Utc;

use super::{LibSqlBackend, classify_write_error, fmt_ts, get_text};
use crate::db::{NewUser, SystemStateStore, state_keys};
use crate::error::DatabaseError;
use crate::identity::WalletAddress;

const UPSERT_STATE: &str = "INSERT INTO system_state (key, value, updated_at) VALUES (?1, ?2, ?3) \
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

#[async_trait]
impl SystemStateStore for LibSqlBackend {
    async fn get_state(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT value FROM system_state WHERE key = ?1",
                libsql::params![key],
            )
            .await?;
        Ok(rows.next().await?.map(|row| get_text(&row, 0)))
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            UPSERT_STATE,
            libsql::params![key, value, fmt_ts(&Utc::now())],
        )
        .await?;
        Ok(())
    }

    async fn complete_bootstrap(
        &self,
        root: &NewUser,
        contract_address: &WalletAddress,
    ) -> Result<bool, DatabaseError> {
        let now = fmt_ts(&Utc::now());
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;

        // Claim the root identity first so the write lock is taken before
        // anything else; a concurrent bootstrap finds the key and backs off.
        let claimed = tx
            .execute(
                "INSERT INTO system_state (key, value, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(key) DO NOTHING",
                libsql::params![state_keys::ROOT_IDENTITY, root.wallet.as_str(), now.as_str()],
            )
            .await?;
        if claimed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // The deployer may already have registered as a plain user.
        tx.execute(
            "INSERT INTO users (wallet, email, display_name, role, created_at) \
             VALUES (?1, ?2, ?3, 'root', ?4) \
             ON CONFLICT(wallet) DO UPDATE SET role = 'root'",
            libsql::params![
                root.wallet.as_str(),
                root.email.as_str(),
                root.display_name.as_str(),
                now.as_str(),
            ],
        )
        .await
        .map_err(classify_write_error)?;
        tx.execute(
            UPSERT_STATE,
            libsql::params![
                state_keys::CONTRACT_ADDRESS,
                contract_address.as_str(),
                now.as_str()
            ],
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
