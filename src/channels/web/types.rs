//! Request and response bodies for the gateway.

use serde::{Deserialize, Serialize};

use crate::chain::UnsignedTransaction;
use crate::identity::{TxHash, WalletAddress};
use crate::privileged::OperationKind;
use crate::service::PublicUser;

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub wallet: WalletAddress,
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub wallet: WalletAddress,
    /// The exact message the wallet must personal-sign.
    pub nonce: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub wallet: WalletAddress,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub wallet: WalletAddress,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UserInfoRequest {
    pub wallets: Vec<WalletAddress>,
}

#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub users: Vec<PublicUser>,
}

/// Target of an admin add/remove build.
#[derive(Debug, Deserialize)]
pub struct AdminTargetRequest {
    pub wallet: WalletAddress,
}

#[derive(Debug, Serialize)]
pub struct BuildResponse {
    pub operation: OperationKind,
    pub transaction: UnsignedTransaction,
}

/// Either the hash of a transaction the caller broadcast, or the signed
/// transaction for the gateway to relay.
#[derive(Debug, Default, Deserialize)]
pub struct TxSubmission {
    #[serde(default)]
    pub tx_hash: Option<TxHash>,
    #[serde(default)]
    pub signed_tx: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminExecRequest {
    pub wallet: WalletAddress,
    #[serde(flatten)]
    pub submission: TxSubmission,
}

#[derive(Debug, Deserialize)]
pub struct CreateVoteRequest {
    /// Address of the deployed vote contract; normalized before storing.
    pub vote_address: String,
}

#[derive(Debug, Serialize)]
pub struct ContractResponse {
    pub address: Option<WalletAddress>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}
