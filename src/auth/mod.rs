//! Wallet challenge/response authentication and session tokens.

pub mod challenge;
pub mod session;
pub mod signature;

pub use challenge::ChallengeStore;
pub use session::SessionTokenService;
pub use signature::{eip191_personal_sign_hash, recover_signer, verify};
