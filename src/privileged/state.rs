//! State record for one two-phase privileged operation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PrivilegedError;
use crate::identity::{TxHash, WalletAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Bootstrap,
    AddAdmin,
    RemoveAdmin,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::AddAdmin => "add_admin",
            Self::RemoveAdmin => "remove_admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bootstrap" => Some(Self::Bootstrap),
            "add_admin" => Some(Self::AddAdmin),
            "remove_admin" => Some(Self::RemoveAdmin),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Requested,
    TxBuilt,
    AwaitingConfirmation,
    Confirmed,
    CacheUpdated,
    Rejected,
}

impl OperationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::TxBuilt => "tx_built",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Confirmed => "confirmed",
            Self::CacheUpdated => "cache_updated",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "requested" => Some(Self::Requested),
            "tx_built" => Some(Self::TxBuilt),
            "awaiting_confirmation" => Some(Self::AwaitingConfirmation),
            "confirmed" => Some(Self::Confirmed),
            "cache_updated" => Some(Self::CacheUpdated),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CacheUpdated | Self::Rejected)
    }

    /// Allowed edges. Re-entering `TxBuilt` covers a rebuilt transaction and
    /// re-entering `AwaitingConfirmation` covers a retried confirmation.
    pub fn can_advance_to(self, next: OperationState) -> bool {
        use OperationState::*;
        match (self, next) {
            (_, Rejected) => !self.is_terminal(),
            (Requested, TxBuilt) => true,
            (TxBuilt, TxBuilt | AwaitingConfirmation) => true,
            (AwaitingConfirmation, AwaitingConfirmation | Confirmed) => true,
            (Confirmed, AwaitingConfirmation | CacheUpdated) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress of one operation, keyed by `(kind, target)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub target: WalletAddress,
    pub actor: Option<WalletAddress>,
    pub state: OperationState,
    pub tx_hash: Option<TxHash>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OperationRecord {
    pub fn requested(kind: OperationKind, target: WalletAddress, actor: Option<WalletAddress>) -> Self {
        let now = Utc::now();
        Self {
            kind,
            target,
            actor,
            state: OperationState::Requested,
            tx_hash: None,
            detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, next: OperationState) -> Result<(), PrivilegedError> {
        if !self.state.can_advance_to(next) {
            return Err(PrivilegedError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(
            kind = %self.kind,
            target = %self.target,
            from = %self.state,
            to = %next,
            "Privileged operation transition"
        );
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Terminal failure carrying the reason.
    pub fn reject(&mut self, reason: impl Into<String>) {
        self.detail = Some(reason.into());
        if !self.state.is_terminal() {
            self.state = OperationState::Rejected;
        }
        self.updated_at = Utc::now();
    }
}
