//! Two-phase privileged operations: build an unsigned transaction, then
//! confirm it on-chain and apply the cached side effect.

mod coordinator;
mod state;

pub use coordinator::{ConfirmOutcome, CoordinatorSettings, PrivilegedOperationCoordinator};
pub use state::{OperationKind, OperationRecord, OperationState};
