//! Calls on the admin registry of the voting NFT contract.

use alloy_primitives::Address;
use alloy_sol_types::SolValue;
use sha3::{Digest, Keccak256};

use crate::error::ChainError;
use crate::identity::WalletAddress;

/// The contract methods this service builds or simulates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    AddAdmin(WalletAddress),
    RemoveAdmin(WalletAddress),
    IsAdministrator(WalletAddress),
    GetAllAdmins,
}

impl AdminCall {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::AddAdmin(_) => "addAdmin",
            Self::RemoveAdmin(_) => "removeAdmin",
            Self::IsAdministrator(_) => "isAdministrator",
            Self::GetAllAdmins => "getAllAdmins",
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            Self::AddAdmin(_) => "addAdmin(address)",
            Self::RemoveAdmin(_) => "removeAdmin(address)",
            Self::IsAdministrator(_) => "isAdministrator(address)",
            Self::GetAllAdmins => "getAllAdmins()",
        }
    }

    /// Selector followed by the ABI-encoded arguments.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = selector(self.signature()).to_vec();
        match self {
            Self::AddAdmin(wallet) | Self::RemoveAdmin(wallet) | Self::IsAdministrator(wallet) => {
                data.extend_from_slice(&wallet.to_address().abi_encode());
            }
            Self::GetAllAdmins => {}
        }
        data
    }
}

/// First four bytes of the Keccak-256 of a canonical function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

pub fn decode_bool(data: &[u8]) -> Result<bool, ChainError> {
    bool::abi_decode(data, true).map_err(|e| ChainError::Decode(format!("bool return: {e}")))
}

pub fn decode_address_list(data: &[u8]) -> Result<Vec<WalletAddress>, ChainError> {
    let addresses = Vec::<Address>::abi_decode(data, true)
        .map_err(|e| ChainError::Decode(format!("address[] return: {e}")))?;
    Ok(addresses.into_iter().map(WalletAddress::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_known_vectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
    }

    #[test]
    fn encodes_address_argument_as_one_word() {
        let wallet = WalletAddress::parse("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap();
        let data = AdminCall::AddAdmin(wallet).encode();

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &selector("addAdmin(address)"));
        assert!(data[4..16].iter().all(|b| *b == 0));
        assert_eq!(
            hex::encode(&data[16..]),
            "f39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(AdminCall::GetAllAdmins.encode().len(), 4);
    }

    #[test]
    fn decodes_return_values() {
        let mut word = [0u8; 32];
        word[31] = 1;
        assert!(decode_bool(&word).unwrap());
        assert!(!decode_bool(&[0u8; 32]).unwrap());

        let a = WalletAddress::parse(&"a".repeat(40)).unwrap();
        let b = WalletAddress::parse(&"b".repeat(40)).unwrap();
        let encoded = vec![a.to_address(), b.to_address()].abi_encode();
        assert_eq!(decode_address_list(&encoded).unwrap(), vec![a, b]);

        assert!(decode_address_list(&[1, 2, 3]).is_err());
    }
}
