//! OperationStore implementation for LibSqlBackend.

use async_trait::async_trait;

use super::{LibSqlBackend, fmt_ts, get_opt_text, get_text, get_ts, opt_text_owned};
use crate::db::OperationStore;
use crate::error::DatabaseError;
use crate::identity::{TxHash, WalletAddress};
use crate::privileged::{OperationKind, OperationRecord, OperationState};

fn row_to_operation(row: &libsql::Row) -> Result<OperationRecord, DatabaseError> {
    let kind_raw = get_text(row, 0);
    let kind = OperationKind::parse(&kind_raw)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown operation kind {kind_raw}")))?;
    let state_raw = get_text(row, 3);
    let state = OperationState::parse(&state_raw).ok_or_else(|| {
        DatabaseError::Serialization(format!("unknown operation state {state_raw}"))
    })?;
    let target = WalletAddress::parse(&get_text(row, 1))
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let actor = get_opt_text(row, 2)
        .map(|raw| WalletAddress::parse(&raw))
        .transpose()
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let tx_hash = get_opt_text(row, 4)
        .map(|raw| TxHash::parse(&raw))
        .transpose()
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

    Ok(OperationRecord {
        kind,
        target,
        actor,
        state,
        tx_hash,
        detail: get_opt_text(row, 5),
        created_at: get_ts(row, 6)?,
        updated_at: get_ts(row, 7)?,
    })
}

#[async_trait]
impl OperationStore for LibSqlBackend {
    async fn get_operation(
        &self,
        kind: OperationKind,
        target: &WalletAddress,
    ) -> Result<Option<OperationRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT kind, target, actor, state, tx_hash, detail, created_at, updated_at \
                 FROM privileged_operations WHERE kind = ?1 AND target = ?2",
                libsql::params![kind.as_str(), target.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_operation(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_operation(&self, record: &OperationRecord) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO privileged_operations \
             (kind, target, actor, state, tx_hash, detail, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(kind, target) DO UPDATE SET \
             actor = excluded.actor, state = excluded.state, tx_hash = excluded.tx_hash, \
             detail = excluded.detail, created_at = excluded.created_at, \
             updated_at = excluded.updated_at",
            libsql::params![
                record.kind.as_str(),
                record.target.as_str(),
                opt_text_owned(record.actor.as_ref().map(|a| a.to_string())),
                record.state.as_str(),
                opt_text_owned(record.tx_hash.as_ref().map(|h| h.to_string())),
                opt_text_owned(record.detail.clone()),
                fmt_ts(&record.created_at),
                fmt_ts(&record.updated_at),
            ],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn saves_and_overwrites_by_kind_and_target() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LibSqlBackend::new_local(&dir.path().join("ops.db"))
            .await
            .unwrap();
        backend.run_migrations().await.unwrap();

        let target = WalletAddress::parse(&"b".repeat(40)).unwrap();
        let mut record = OperationRecord::requested(OperationKind::AddAdmin, target.clone(), None);
        record.advance(OperationState::TxBuilt).unwrap();
        backend.save_operation(&record).await.unwrap();

        record.advance(OperationState::AwaitingConfirmation).unwrap();
        record.tx_hash = Some(TxHash::parse(&"c".repeat(64)).unwrap());
        backend.save_operation(&record).await.unwrap();

        let loaded = backend
            .get_operation(OperationKind::AddAdmin, &target)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.state, OperationState::AwaitingConfirmation);
        assert_eq!(loaded.tx_hash, record.tx_hash);
        assert!(loaded.actor.is_none());

        assert!(
            backend
                .get_operation(OperationKind::RemoveAdmin, &target)
                .await
                .unwrap()
                .is_none()
        );
    }
}
