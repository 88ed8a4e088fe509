//! VoteStore implementation for LibSqlBackend.

use async_trait::async_trait;
use chrono::Utc;

use super::{LibSqlBackend, classify_write_error, fmt_ts, get_text, get_ts};
use crate::db::{VoteRecord, VoteStore};
use crate::error::DatabaseError;
use crate::identity::WalletAddress;

fn row_to_vote(row: &libsql::Row) -> Result<VoteRecord, DatabaseError> {
    let address = |idx| {
        WalletAddress::parse(&get_text(row, idx))
            .map_err(|e| DatabaseError::Serialization(e.to_string()))
    };
    Ok(VoteRecord {
        contract_address: address(0)?,
        owner: address(1)?,
        created_at: get_ts(row, 2)?,
    })
}

#[async_trait]
impl VoteStore for LibSqlBackend {
    async fn insert_vote(
        &self,
        contract_address: &WalletAddress,
        owner: &WalletAddress,
    ) -> Result<VoteRecord, DatabaseError> {
        let created_at = Utc::now();
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO votes (contract_address, owner, created_at) VALUES (?1, ?2, ?3)",
            libsql::params![
                contract_address.as_str(),
                owner.as_str(),
                fmt_ts(&created_at),
            ],
        )
        .await
        .map_err(classify_write_error)?;

        Ok(VoteRecord {
            contract_address: contract_address.clone(),
            owner: owner.clone(),
            created_at,
        })
    }

    async fn get_vote(
        &self,
        contract_address: &WalletAddress,
    ) -> Result<Option<VoteRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT contract_address, owner, created_at FROM votes WHERE contract_address = ?1",
                libsql::params![contract_address.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_vote(&row)?)),
            None => Ok(None),
        }
    }
}
