//! Recover and check the signer of an Ethereum personal-sign message.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::AuthError;
use crate::identity::WalletAddress;

/// Keccak-256 of `"\x19Ethereum Signed Message:\n" + len + message`.
pub fn eip191_personal_sign_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let prefix = format!("\x19Ethereum Signed Message:\n{}", bytes.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Recover the wallet that produced `signature_hex` over `message`.
pub fn recover_signer(message: &str, signature_hex: &str) -> Result<WalletAddress, AuthError> {
    let trimmed = signature_hex.trim();
    let body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(body)
        .map_err(|e| AuthError::MalformedSignature(format!("invalid hex: {e}")))?;
    if bytes.len() != 65 {
        return Err(AuthError::MalformedSignature(format!(
            "signature must decode to 65 bytes, got {}",
            bytes.len()
        )));
    }

    let sig = EcdsaSignature::try_from(&bytes[..64])
        .map_err(|e| AuthError::MalformedSignature(format!("invalid ECDSA bytes: {e}")))?;
    let recovery_id = normalize_recovery_id(bytes[64])?;
    let prehash = eip191_personal_sign_hash(message);
    let key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|e| AuthError::MalformedSignature(format!("recovery failed: {e}")))?;
    Ok(address_from_verifying_key(&key))
}

/// Check that `signature_hex` over `nonce` was produced by `claimed`.
pub fn verify(nonce: &str, signature_hex: &str, claimed: &WalletAddress) -> Result<(), AuthError> {
    let recovered = recover_signer(nonce, signature_hex)?;
    if &recovered != claimed {
        tracing::warn!(claimed = %claimed, recovered = %recovered, "Signature signer mismatch");
        return Err(AuthError::SignatureMismatch);
    }
    Ok(())
}

/// Wallets emit either the raw recovery bit or the legacy 27/28 form.
fn normalize_recovery_id(raw: u8) -> Result<RecoveryId, AuthError> {
    let id = match raw {
        27 | 28 => raw - 27,
        0 | 1 => raw,
        _ => {
            return Err(AuthError::MalformedSignature(format!(
                "recovery id must be 0/1 or 27/28, got {raw}"
            )));
        }
    };
    RecoveryId::try_from(id)
        .map_err(|_| AuthError::MalformedSignature("recovery id is invalid".to_string()))
}

pub fn address_from_verifying_key(key: &VerifyingKey) -> WalletAddress {
    let encoded = key.to_encoded_point(false);
    // Uncompressed SEC1: 0x04 || X || Y.
    let digest = Keccak256::digest(&encoded.as_bytes()[1..]);
    WalletAddress::from(alloy_primitives::Address::from_slice(&digest[12..]))
}

#[cfg(test)]
pub(crate) mod test_support {
    use k256::ecdsa::SigningKey;

    use super::*;

    /// First well-known development key (Hardhat/Anvil account #0).
    pub const DEV_KEY_0: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    /// Second well-known development key (account #1).
    pub const DEV_KEY_1: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    pub fn signing_key(hex_key: &str) -> SigningKey {
        let bytes = hex::decode(hex_key).expect("key hex");
        SigningKey::from_slice(&bytes).expect("signing key")
    }

    pub fn wallet_of(key: &SigningKey) -> WalletAddress {
        address_from_verifying_key(key.verifying_key())
    }

    pub fn personal_sign(key: &SigningKey, message: &str) -> String {
        let prehash = eip191_personal_sign_hash(message);
        let (sig, recid) = key.sign_prehash_recoverable(&prehash).expect("sign message");
        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(recid.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }
}
