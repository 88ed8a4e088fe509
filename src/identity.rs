//! Canonical wallet identities and transaction hashes.
//!
//! Every identity that crosses a boundary (request body, token claim, chain
//! response, database row) goes through [`WalletAddress::parse`], so
//! comparisons are plain string equality on lower-case hex with no `0x`.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Strip an optional `0x`/`0X` prefix and lower-case the remainder.
pub fn normalize_hex(value: &str) -> String {
    let trimmed = value.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    body.to_ascii_lowercase()
}

/// A normalized 20-byte wallet address: 40 lower-case hex chars, no prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn parse(value: &str) -> Result<Self, Error> {
        let hex = normalize_hex(value);
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a 20-byte hex wallet address",
                value.trim()
            )));
        }
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x`-prefixed form used on the JSON-RPC wire.
    pub fn to_prefixed(&self) -> String {
        format!("0x{}", self.0)
    }

    pub fn to_address(&self) -> Address {
        let mut bytes = [0u8; 20];
        // Constructed only from validated 40-char hex.
        if hex::decode_to_slice(&self.0, &mut bytes).is_err() {
            return Address::ZERO;
        }
        Address::from(bytes)
    }
}

impl From<Address> for WalletAddress {
    fn from(address: Address) -> Self {
        Self(hex::encode(address.as_slice()))
    }
}

impl FromStr for WalletAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A normalized 32-byte transaction hash: 64 lower-case hex chars, no prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHash(String);

impl TxHash {
    pub fn parse(value: &str) -> Result<Self, Error> {
        let hex = normalize_hex(value);
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a 32-byte transaction hash",
                value.trim()
            )));
        }
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_prefixed(&self) -> String {
        format!("0x{}", self.0)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
