//! Signed session tokens bound to a revocation epoch.
//!
//! Tokens are HS256 JWTs carrying the wallet, the issue time and the server
//! epoch current at issuance. Rotating the epoch invalidates every token
//! issued before the rotation without keeping a revocation list.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

use crate::error::AuthError;
use crate::identity::WalletAddress;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    wallet: String,
    iat: i64,
    epoch: String,
}

/// Issues and validates session tokens.
pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
    epoch: RwLock<String>,
}

impl SessionTokenService {
    pub fn new(secret: &SecretString, expiry_hours: u32, epoch: String) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            expiry_hours: i64::from(expiry_hours),
            epoch: RwLock::new(epoch),
        }
    }

    pub async fn issue(&self, identity: &WalletAddress) -> Result<String, AuthError> {
        self.issue_at(identity, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        identity: &WalletAddress,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = SessionClaims {
            wallet: identity.to_string(),
            iat: now.timestamp(),
            epoch: self.epoch.read().await.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to sign session token: {}", e);
            AuthError::InvalidToken
        })
    }

    pub async fn verify(&self, token: &str) -> Result<WalletAddress, AuthError> {
        self.verify_at(token, Utc::now()).await
    }

    /// Check signature, then epoch, then age.
    pub async fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<WalletAddress, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is derived from `iat` and the configured window, not `exp`.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims = data.claims;
        let wallet = WalletAddress::parse(&claims.wallet).map_err(|_| AuthError::InvalidToken)?;

        let current = self.epoch.read().await;
        if !bool::from(claims.epoch.as_bytes().ct_eq(current.as_bytes())) {
            return Err(AuthError::EpochMismatch);
        }
        drop(current);

        if now.timestamp() - claims.iat > self.expiry_hours * 3600 {
            return Err(AuthError::TokenExpired);
        }
        Ok(wallet)
    }

    pub async fn current_epoch(&self) -> String {
        self.epoch.read().await.clone()
    }

    pub async fn set_epoch(&self, epoch: String) {
        *self.epoch.write().await = epoch;
    }
}

/// 16 random bytes, hex-encoded.
pub fn random_epoch() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn service() -> SessionTokenService {
        SessionTokenService::new(
            &SecretString::from("test-secret-please-rotate".to_string()),
            24,
            "epoch-1".to_string(),
        )
    }

    fn wallet() -> WalletAddress {
        WalletAddress::parse("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap()
    }

    #[tokio::test]
    async fn issued_token_verifies() {
        let svc = service();
        let token = svc.issue(&wallet()).await.unwrap();
        assert_eq!(svc.verify(&token).await.unwrap(), wallet());
    }

    #[tokio::test]
    async fn token_expires_after_window() {
        let svc = service();
        let issued = Utc::now();
        let token = svc.issue_at(&wallet(), issued).await.unwrap();

        let inside = issued + Duration::hours(24);
        assert!(svc.verify_at(&token, inside).await.is_ok());

        let outside = issued + Duration::hours(24) + Duration::seconds(1);
        assert!(matches!(
            svc.verify_at(&token, outside).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn rotation_invalidates_outstanding_tokens() {
        let svc = service();
        let token = svc.issue(&wallet()).await.unwrap();

        svc.set_epoch(random_epoch()).await;
        assert!(matches!(
            svc.verify(&token).await,
            Err(AuthError::EpochMismatch)
        ));

        let fresh = svc.issue(&wallet()).await.unwrap();
        assert!(svc.verify(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn epoch_is_checked_before_expiry() {
        let svc = service();
        let issued = Utc::now() - Duration::hours(48);
        let token = svc.issue_at(&wallet(), issued).await.unwrap();
        svc.set_epoch("epoch-2".to_string()).await;

        assert!(matches!(
            svc.verify(&token).await,
            Err(AuthError::EpochMismatch)
        ));
    }

    #[tokio::test]
    async fn foreign_secret_and_garbage_are_invalid() {
        let svc = service();
        let other = SessionTokenService::new(
            &SecretString::from("another-secret".to_string()),
            24,
            "epoch-1".to_string(),
        );
        let token = other.issue(&wallet()).await.unwrap();

        assert!(matches!(
            svc.verify(&token).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            svc.verify("not.a.token").await,
            Err(AuthError::InvalidToken)
        ));
    }
}
