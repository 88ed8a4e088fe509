//! Error types for voteauth.

use serde::Serialize;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Role error: {0}")]
    Role(#[from] RoleError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Privileged operation error: {0}")]
    Privileged(#[from] PrivilegedError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Gateway failed to start: {0}")]
    Startup(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

/// Authentication failures. Every variant means "unauthenticated" to callers.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No outstanding challenge for {identity}")]
    ChallengeNotFound { identity: String },

    #[error("Signature does not match the claimed wallet")]
    SignatureMismatch,

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Invalid session token")]
    InvalidToken,

    #[error("Session epoch has been rotated")]
    EpochMismatch,

    #[error("Session token expired")]
    TokenExpired,

    #[error("Missing role {required}")]
    Forbidden { required: String },
}

/// Role authority errors.
#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("Unknown stored role value '{0}'")]
    UnknownRole(String),

    #[error("The void role cannot be persisted")]
    VoidNotPersistable,
}

/// Chain collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Chain RPC unavailable: {0}")]
    Unavailable(String),

    #[error("ABI encoding failed: {0}")]
    Encoding(String),

    #[error("Gas estimation failed (probable revert): {0}")]
    GasEstimationFailed(String),

    #[error("Receipt fetch failed: {0}")]
    ReceiptFetchFailed(String),

    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("Timed out waiting for receipt of {tx_hash} after {waited_secs}s")]
    Timeout { tx_hash: String, waited_secs: u64 },

    #[error("Receipt wait cancelled for {tx_hash}")]
    Cancelled { tx_hash: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Contract artifact error: {0}")]
    Artifact(String),

    #[error("Malformed chain response: {0}")]
    Decode(String),
}

/// Two-phase privileged operation errors.
#[derive(Debug, thiserror::Error)]
pub enum PrivilegedError {
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("Chain and cache diverged for {target}: expected isAdministrator={expected}")]
    ChainCacheDivergence { target: String, expected: bool },

    #[error("Receipt does not match the operation: {0}")]
    ReceiptMismatch(String),

    #[error("Invalid operation transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Failure class used to decide how callers surface and retry an error.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Input,
    Authentication,
    Authorization,
    ChainAvailability,
    Consistency,
    Internal,
}

/// Structured error payload returned over the gateway.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub class: ErrorClass,
    pub code: &'static str,
    pub retryable: bool,
    pub message: String,
}

impl ErrorPayload {
    fn new(
        class: ErrorClass,
        code: &'static str,
        retryable: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            class,
            code,
            retryable,
            message: message.into(),
        }
    }
}

impl ChainError {
    /// Transient failures leave a privileged operation where it was.
    pub fn is_availability(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::ReceiptFetchFailed(_)
                | Self::Timeout { .. }
                | Self::Cancelled { .. }
                | Self::Rpc { .. }
        )
    }

    fn to_error_payload(&self) -> ErrorPayload {
        let message = self.to_string();
        match self {
            Self::Unavailable(_) => {
                ErrorPayload::new(ErrorClass::ChainAvailability, "chain.unavailable", true, message)
            }
            Self::ReceiptFetchFailed(_) => ErrorPayload::new(
                ErrorClass::ChainAvailability,
                "chain.receipt_fetch_failed",
                true,
                message,
            ),
            Self::Timeout { .. } => {
                ErrorPayload::new(ErrorClass::ChainAvailability, "chain.timeout", true, message)
            }
            Self::Cancelled { .. } => {
                ErrorPayload::new(ErrorClass::ChainAvailability, "chain.cancelled", true, message)
            }
            Self::Encoding(_) => {
                ErrorPayload::new(ErrorClass::Input, "chain.encoding_error", false, message)
            }
            Self::GasEstimationFailed(_) => ErrorPayload::new(
                ErrorClass::Input,
                "chain.gas_estimation_failed",
                false,
                message,
            ),
            Self::Reverted { .. } => {
                ErrorPayload::new(ErrorClass::Consistency, "chain.reverted", false, message)
            }
            Self::Rpc { .. } => {
                ErrorPayload::new(ErrorClass::ChainAvailability, "chain.rpc_error", true, message)
            }
            Self::Artifact(_) | Self::Decode(_) => {
                ErrorPayload::new(ErrorClass::Internal, "chain.internal", false, message)
            }
        }
    }
}

impl Error {
    /// Map an error onto the failure taxonomy used by the gateway.
    pub fn to_error_payload(&self) -> ErrorPayload {
        match self {
            Self::Auth(err) => match err {
                AuthError::Forbidden { .. } => ErrorPayload::new(
                    ErrorClass::Authorization,
                    "auth.forbidden",
                    false,
                    "not authorized",
                ),
                AuthError::ChallengeNotFound { .. } => ErrorPayload::new(
                    ErrorClass::Authentication,
                    "auth.challenge_not_found",
                    false,
                    err.to_string(),
                ),
                AuthError::SignatureMismatch => ErrorPayload::new(
                    ErrorClass::Authentication,
                    "auth.signature_mismatch",
                    false,
                    err.to_string(),
                ),
                AuthError::MalformedSignature(_) => ErrorPayload::new(
                    ErrorClass::Authentication,
                    "auth.malformed_signature",
                    false,
                    err.to_string(),
                ),
                // Token failures are distinct in logs only.
                AuthError::InvalidToken | AuthError::EpochMismatch | AuthError::TokenExpired => {
                    ErrorPayload::new(
                        ErrorClass::Authentication,
                        "auth.unauthenticated",
                        false,
                        "unauthenticated",
                    )
                }
            },
            Self::Role(RoleError::UnknownRole(_)) => ErrorPayload::new(
                ErrorClass::Authorization,
                "auth.forbidden",
                false,
                "not authorized",
            ),
            Self::Role(err @ RoleError::VoidNotPersistable) => {
                ErrorPayload::new(ErrorClass::Internal, "role.void_persist", false, err.to_string())
            }
            Self::Chain(err) => err.to_error_payload(),
            Self::Privileged(err) => match err {
                PrivilegedError::PreconditionNotMet(_) => ErrorPayload::new(
                    ErrorClass::Consistency,
                    "privileged.precondition_not_met",
                    false,
                    err.to_string(),
                ),
                PrivilegedError::ChainCacheDivergence { .. } => ErrorPayload::new(
                    ErrorClass::Consistency,
                    "privileged.chain_cache_divergence",
                    false,
                    err.to_string(),
                ),
                PrivilegedError::ReceiptMismatch(_) => ErrorPayload::new(
                    ErrorClass::Consistency,
                    "privileged.receipt_mismatch",
                    false,
                    err.to_string(),
                ),
                PrivilegedError::InvalidTransition { .. } => ErrorPayload::new(
                    ErrorClass::Consistency,
                    "privileged.invalid_transition",
                    false,
                    err.to_string(),
                ),
            },
            Self::InvalidInput(message) => {
                ErrorPayload::new(ErrorClass::Input, "input.invalid", false, message.clone())
            }
            Self::Conflict(message) => {
                ErrorPayload::new(ErrorClass::Input, "input.conflict", false, message.clone())
            }
            Self::Database(DatabaseError::NotFound { .. }) => {
                ErrorPayload::new(ErrorClass::Input, "input.not_found", false, self.to_string())
            }
            Self::Database(_) | Self::Config(_) | Self::Startup(_) => ErrorPayload::new(
                ErrorClass::Internal,
                "internal.error",
                false,
                "internal error",
            ),
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
