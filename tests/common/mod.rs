//! Shared fixtures for integration tests: an in-memory chain that behaves
//! like the voting NFT contract, signing wallets, and a wired service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_primitives::Address;
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use secrecy::SecretString;
use sha3::{Digest, Keccak256};
use tempfile::TempDir;
use tokio::sync::watch;

use voteauth::auth::signature::{address_from_verifying_key, eip191_personal_sign_hash};
use voteauth::chain::contract::selector;
use voteauth::chain::{
    ArtifactSource, CallRequest, ChainRpc, ChainTxLifecycle, ContractArtifact, TransactionReceipt,
};
use voteauth::config::AuthConfig;
use voteauth::db::libsql::LibSqlBackend;
use voteauth::db::Database;
use voteauth::error::ChainError;
use voteauth::identity::{TxHash, WalletAddress};
use voteauth::privileged::CoordinatorSettings;
use voteauth::service::AuthorityService;

pub const NFT_CONTRACT: &str = "VotingNFT";

pub const NFT_ABI: &str = r#"[
    {"type":"constructor","inputs":[]},
    {"type":"function","name":"addAdmin","inputs":[{"name":"admin","type":"address"}],"outputs":[]},
    {"type":"function","name":"removeAdmin","inputs":[{"name":"admin","type":"address"}],"outputs":[]},
    {"type":"function","name":"isAdministrator","inputs":[{"name":"a","type":"address"}],"outputs":[{"name":"","type":"bool"}]},
    {"type":"function","name":"getAllAdmins","inputs":[],"outputs":[{"name":"","type":"address[]"}]}
]"#;

pub const NFT_BYTECODE: &str = "0x6080604052348015600f57600080fd5b50";

/// Hardhat/Anvil development keys #0..#2.
pub const DEV_KEYS: [&str; 3] = [
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
];

// ── Wallets ─────────────────────────────────────────────────────

pub struct TestWallet {
    key: SigningKey,
    pub address: WalletAddress,
}

impl TestWallet {
    pub fn dev(index: usize) -> Self {
        let bytes = hex::decode(DEV_KEYS[index]).unwrap();
        let key = SigningKey::from_slice(&bytes).unwrap();
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    /// `personal_sign` with the legacy 27/28 recovery byte, as MetaMask emits.
    pub fn sign(&self, message: &str) -> String {
        let prehash = eip191_personal_sign_hash(message);
        let (sig, recid) = self.key.sign_prehash_recoverable(&prehash).unwrap();
        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(recid.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }
}

// ── Chain ───────────────────────────────────────────────────────

/// Receipts are "mined" explicitly by the test, standing in for the
/// caller's wallet broadcasting the built transaction.
pub struct MockChain {
    pub contract: WalletAddress,
    admins: Mutex<Vec<WalletAddress>>,
    receipts: Mutex<HashMap<TxHash, TransactionReceipt>>,
    relayed: Mutex<Vec<Vec<u8>>>,
    offline: AtomicBool,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            contract: WalletAddress::parse(&"c0".repeat(20)).unwrap(),
            admins: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
            relayed: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn admins(&self) -> Vec<WalletAddress> {
        self.admins.lock().unwrap().clone()
    }

    /// Overwrite the contract's admin list without a transaction.
    pub fn set_admins(&self, admins: Vec<WalletAddress>) {
        *self.admins.lock().unwrap() = admins;
    }

    pub fn relayed(&self) -> Vec<Vec<u8>> {
        self.relayed.lock().unwrap().clone()
    }

    pub fn mine_deployment(&self, hash: &TxHash, from: &WalletAddress) {
        self.insert_receipt(hash, true, from, None, Some(self.contract.clone()));
    }

    /// Mine an add/remove call and apply it to the admin list.
    pub fn mine_admin_change(&self, hash: &TxHash, from: &WalletAddress, add: bool, target: &WalletAddress) {
        {
            let mut admins = self.admins.lock().unwrap();
            admins.retain(|a| a != target);
            if add {
                admins.push(target.clone());
            }
        }
        self.insert_receipt(hash, true, from, Some(self.contract.clone()), None);
    }

    /// Mine a successful call that leaves the admin list untouched.
    pub fn mine_noop_call(&self, hash: &TxHash, from: &WalletAddress) {
        self.insert_receipt(hash, true, from, Some(self.contract.clone()), None);
    }

    pub fn mine_reverted(&self, hash: &TxHash, from: &WalletAddress) {
        self.insert_receipt(hash, false, from, Some(self.contract.clone()), None);
    }

    fn insert_receipt(
        &self,
        hash: &TxHash,
        success: bool,
        from: &WalletAddress,
        to: Option<WalletAddress>,
        contract_address: Option<WalletAddress>,
    ) {
        self.receipts.lock().unwrap().insert(
            hash.clone(),
            TransactionReceipt {
                tx_hash: hash.clone(),
                success,
                from: from.clone(),
                to,
                contract_address,
                block_number: 1,
            },
        );
    }

    fn check_online(&self) -> Result<(), ChainError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChainError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn pending_nonce(&self, _: &WalletAddress) -> Result<u64, ChainError> {
        self.check_online()?;
        Ok(0)
    }

    async fn suggest_gas_price(&self) -> Result<u128, ChainError> {
        self.check_online()?;
        Ok(1_000_000_000)
    }

    async fn estimate_gas(&self, _: &CallRequest) -> Result<u64, ChainError> {
        self.check_online()?;
        Ok(60_000)
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.check_online()?;
        Ok(31337)
    }

    async fn send_raw_transaction(&self, signed: &[u8]) -> Result<TxHash, ChainError> {
        self.check_online()?;
        self.relayed.lock().unwrap().push(signed.to_vec());
        Ok(tx_hash_of(signed))
    }

    async fn get_receipt(&self, hash: &TxHash) -> Result<Option<TransactionReceipt>, ChainError> {
        self.check_online()?;
        Ok(self.receipts.lock().unwrap().get(hash).cloned())
    }

    async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, ChainError> {
        self.check_online()?;
        if call.data.len() < 4 {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "execution reverted".into(),
            });
        }
        let (sel, args) = call.data.split_at(4);
        let admins = self.admins();
        if sel == selector("isAdministrator(address)") {
            let who = Address::abi_decode(args, true)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            Ok(admins.contains(&WalletAddress::from(who)).abi_encode())
        } else if sel == selector("getAllAdmins()") {
            let list: Vec<Address> = admins.iter().map(WalletAddress::to_address).collect();
            Ok(list.abi_encode())
        } else {
            Err(ChainError::Rpc {
                code: -32000,
                message: "execution reverted".into(),
            })
        }
    }
}

/// The hash `send_raw_transaction` reports for `signed`.
pub fn tx_hash_of(signed: &[u8]) -> TxHash {
    TxHash::parse(&hex::encode(Keccak256::digest(signed))).unwrap()
}

pub fn tx_hash(seed: u8) -> TxHash {
    TxHash::parse(&format!("{seed:02x}").repeat(32)).unwrap()
}

pub struct StaticArtifacts;

#[async_trait]
impl ArtifactSource for StaticArtifacts {
    async fn load(&self, name: &str) -> Result<ContractArtifact, ChainError> {
        if name != NFT_CONTRACT {
            return Err(ChainError::Artifact(format!("unknown artifact {name}")));
        }
        ContractArtifact::from_parts(name, NFT_ABI, NFT_BYTECODE)
    }
}

// ── Service ─────────────────────────────────────────────────────

pub struct Harness {
    pub service: Arc<AuthorityService>,
    pub chain: Arc<MockChain>,
    pub db: Arc<LibSqlBackend>,
    pub shutdown: watch::Sender<bool>,
    _dir: TempDir,
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        session_secret: SecretString::from("integration-test-secret-0123456789".to_string()),
        initial_epoch: None,
        token_expiry_hours: 24,
        challenge_ttl: Duration::from_secs(600),
    }
}

pub async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(
        LibSqlBackend::new_local(&dir.path().join("voteauth.db"))
            .await
            .unwrap(),
    );
    let chain = Arc::new(MockChain::new());
    let lifecycle = Arc::new(ChainTxLifecycle::new(
        chain.clone(),
        Arc::new(StaticArtifacts),
        5_000_000,
    ));
    let (shutdown, shutdown_rx) = watch::channel(false);

    let service = AuthorityService::open(
        db.clone() as Arc<dyn Database>,
        lifecycle,
        &auth_config(),
        CoordinatorSettings {
            contract_name: NFT_CONTRACT.to_string(),
            root_email: "root@example.com".to_string(),
            receipt_poll_interval: Duration::from_millis(10),
            receipt_timeout: Duration::from_millis(200),
        },
        shutdown_rx,
    )
    .await
    .unwrap();

    Harness {
        service: Arc::new(service),
        chain,
        db,
        shutdown,
        _dir: dir,
    }
}

impl Harness {
    /// Challenge, sign, verify: returns a session token.
    pub async fn login(&self, wallet: &TestWallet) -> String {
        let nonce = self.service.issue_challenge(&wallet.address);
        self.service
            .verify_challenge_and_issue_session(&wallet.address, &wallet.sign(&nonce))
            .await
            .unwrap()
    }

    /// Build and confirm the bootstrap deployment for `root`.
    pub async fn bootstrap(&self, root: &TestWallet) {
        self.service
            .build_privileged_tx(
                voteauth::privileged::OperationKind::Bootstrap,
                &root.address,
                &root.address,
            )
            .await
            .unwrap();
        let hash = tx_hash(0xb0);
        self.chain.mine_deployment(&hash, &root.address);
        self.service
            .confirm_privileged_tx(
                voteauth::privileged::OperationKind::Bootstrap,
                &root.address,
                &hash,
            )
            .await
            .unwrap();
    }

    pub async fn register(&self, wallet: &TestWallet, name: &str) {
        self.service
            .register_user(&wallet.address, &format!("{name}@example.com"), name)
            .await
            .unwrap();
    }
}
