//! File-backed settings.
//!
//! Stored in `~/.voteauth/config.toml` (or the path given with `--config`).
//! Resolution priority is env var > this file > default; see `crate::config`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub chain: ChainSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allowed browser origin. `None` allows any origin.
    pub cors_origin: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    /// libSQL file path. Defaults to `~/.voteauth/voteauth.db`.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChainSettings {
    pub rpc_url: String,
    /// When set, startup warns if the node reports a different chain.
    pub chain_id: Option<u64>,
    pub rpc_timeout_secs: u64,
    pub artifacts_dir: String,
    pub nft_contract: String,
    pub deployment_gas_limit: u64,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
    pub root_email: String,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: None,
            rpc_timeout_secs: 30,
            artifacts_dir: "contracts/build".to_string(),
            nft_contract: "contracts_VotingNFT_sol_VotingNFT".to_string(),
            deployment_gas_limit: 5_000_000,
            receipt_poll_interval_ms: 1_000,
            receipt_timeout_secs: 300,
            root_email: "root@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthSettings {
    pub token_expiry_hours: u32,
    pub challenge_ttl_secs: u64,
    /// Used only when no epoch has been persisted yet.
    pub initial_epoch: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_expiry_hours: 24,
            challenge_ttl_secs: 600,
            initial_epoch: None,
        }
    }
}

impl Settings {
    pub fn default_toml_path() -> PathBuf {
        crate::bootstrap::voteauth_base_dir().join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &std::path::Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }

    /// Overlay every value in `other` that differs from the default.
    pub fn merge_from(&mut self, other: &Self) {
        let Ok(default_json) = serde_json::to_value(Self::default()) else {
            return;
        };
        let Ok(other_json) = serde_json::to_value(other) else {
            return;
        };
        let Ok(mut self_json) = serde_json::to_value(&*self) else {
            return;
        };

        merge_non_default(&mut self_json, &other_json, &default_json);

        if let Ok(merged) = serde_json::from_value(self_json) {
            *self = merged;
        }
    }
}

fn merge_non_default(
    target: &mut serde_json::Value,
    other: &serde_json::Value,
    defaults: &serde_json::Value,
) {
    match (target, other, defaults) {
        (
            serde_json::Value::Object(t),
            serde_json::Value::Object(o),
            serde_json::Value::Object(d),
        ) => {
            for (key, other_val) in o {
                let default_val = d.get(key).cloned().unwrap_or(serde_json::Value::Null);
                if let Some(target_val) = t.get_mut(key) {
                    merge_non_default(target_val, other_val, &default_val);
                } else if other_val != &default_val {
                    t.insert(key.clone(), other_val.clone());
                }
            }
        }
        (target, other, defaults) => {
            if other != defaults {
                *target = other.clone();
            }
        }
    }
}
