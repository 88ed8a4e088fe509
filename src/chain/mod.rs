//! Chain collaborator: JSON-RPC client, contract artifacts, and the
//! transaction build/confirm lifecycle.

pub mod artifact;
pub mod contract;
pub mod lifecycle;
pub mod rpc;
pub mod types;

pub use artifact::{ArtifactSource, ContractArtifact, DirArtifactLoader};
pub use contract::AdminCall;
pub use lifecycle::{ChainTxLifecycle, DEFAULT_DEPLOYMENT_GAS_LIMIT};
pub use rpc::{ChainRpc, JsonRpcClient};
pub use types::{CallRequest, TransactionReceipt, UnsignedTransaction};
