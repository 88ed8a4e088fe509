//! Configuration for voteauth.
//!
//! Settings are resolved with priority: env var > TOML file > default.
//! `./.env` and `~/.voteauth/.env` are loaded via dotenvy before resolving.
//! The session secret is accepted only from the environment.

pub(crate) mod helpers;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::settings::Settings;

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
}

impl ServerConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let host = helpers::optional_env("HTTP_HOST")?
            .unwrap_or_else(|| settings.server.host.clone());
        let port = helpers::parse_optional_env("HTTP_PORT", settings.server.port)?;
        let cors_origin = helpers::optional_env("CORS_ORIGIN")?
            .or_else(|| settings.server.cors_origin.clone());

        let config = Self {
            host,
            port,
            cors_origin,
        };
        config.socket_addr()?;
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "HTTP_HOST".to_string(),
                message: format!("'{}:{}' is not a socket address: {e}", self.host, self.port),
            })
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let path = helpers::optional_env("LIBSQL_PATH")?
            .or_else(|| settings.database.path.clone())
            .map(PathBuf::from)
            .unwrap_or_else(crate::bootstrap::default_database_path);
        Ok(Self { path })
    }
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: Option<u64>,
    pub rpc_timeout: Duration,
    pub artifacts_dir: PathBuf,
    pub nft_contract: String,
    pub deployment_gas_limit: u64,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
    pub root_email: String,
}

impl ChainConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let defaults = &settings.chain;

        let rpc_url =
            helpers::optional_env("CHAIN_RPC_URL")?.unwrap_or_else(|| defaults.rpc_url.clone());
        if url::Url::parse(&rpc_url).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "CHAIN_RPC_URL".to_string(),
                message: format!("'{rpc_url}' is not a URL"),
            });
        }

        let chain_id = helpers::optional_env("CHAIN_ID")?
            .map(|s| s.parse::<u64>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CHAIN_ID".to_string(),
                message: format!("must be a positive integer: {e}"),
            })?
            .or(defaults.chain_id);

        let rpc_timeout_secs = helpers::require_positive(
            "CHAIN_RPC_TIMEOUT_SECS",
            helpers::parse_optional_env("CHAIN_RPC_TIMEOUT_SECS", defaults.rpc_timeout_secs)?,
        )?;
        let deployment_gas_limit = helpers::require_positive(
            "DEPLOYMENT_GAS_LIMIT",
            helpers::parse_optional_env("DEPLOYMENT_GAS_LIMIT", defaults.deployment_gas_limit)?,
        )?;
        let poll_ms = helpers::require_positive(
            "RECEIPT_POLL_INTERVAL_MS",
            helpers::parse_optional_env(
                "RECEIPT_POLL_INTERVAL_MS",
                defaults.receipt_poll_interval_ms,
            )?,
        )?;
        let timeout_secs = helpers::require_positive(
            "RECEIPT_TIMEOUT_SECS",
            helpers::parse_optional_env("RECEIPT_TIMEOUT_SECS", defaults.receipt_timeout_secs)?,
        )?;

        let root_email =
            helpers::optional_env("ROOT_EMAIL")?.unwrap_or_else(|| defaults.root_email.clone());
        if !root_email.contains('@') {
            return Err(ConfigError::InvalidValue {
                key: "ROOT_EMAIL".to_string(),
                message: format!("'{root_email}' is not an email address"),
            });
        }

        Ok(Self {
            rpc_url,
            chain_id,
            rpc_timeout: Duration::from_secs(rpc_timeout_secs),
            artifacts_dir: helpers::optional_env("CONTRACT_ARTIFACTS_DIR")?
                .unwrap_or_else(|| defaults.artifacts_dir.clone())
                .into(),
            nft_contract: helpers::optional_env("NFT_CONTRACT_NAME")?
                .unwrap_or_else(|| defaults.nft_contract.clone()),
            deployment_gas_limit,
            receipt_poll_interval: Duration::from_millis(poll_ms),
            receipt_timeout: Duration::from_secs(timeout_secs),
            root_email,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_secret: SecretString,
    pub initial_epoch: Option<String>,
    pub token_expiry_hours: u32,
    pub challenge_ttl: Duration,
}

impl AuthConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let secret = helpers::optional_env("SESSION_SECRET")?.ok_or_else(|| {
            ConfigError::MissingRequired {
                key: "SESSION_SECRET".to_string(),
                hint: "Set SESSION_SECRET in the environment or ~/.voteauth/.env".to_string(),
            }
        })?;
        if secret.len() < 16 {
            return Err(ConfigError::InvalidValue {
                key: "SESSION_SECRET".to_string(),
                message: "must be at least 16 characters".to_string(),
            });
        }

        let token_expiry_hours = helpers::parse_optional_env(
            "SESSION_EXPIRY_HOURS",
            settings.auth.token_expiry_hours,
        )?;
        if token_expiry_hours == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SESSION_EXPIRY_HOURS".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        let ttl_secs = helpers::require_positive(
            "CHALLENGE_TTL_SECS",
            helpers::parse_optional_env("CHALLENGE_TTL_SECS", settings.auth.challenge_ttl_secs)?,
        )?;

        Ok(Self {
            session_secret: SecretString::from(secret),
            initial_epoch: helpers::optional_env("SESSION_EPOCH")?
                .or_else(|| settings.auth.initial_epoch.clone()),
            token_expiry_hours,
            challenge_ttl: Duration::from_secs(ttl_secs),
        })
    }
}

impl Config {
    /// Load from env with an optional TOML config file overlay.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_voteauth_env();

        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;
        Self::build(&settings)
    }

    /// Load and merge a TOML config file into settings.
    ///
    /// If `explicit_path` is `Some`, loads from that path (errors are fatal).
    /// If `None`, tries `~/.voteauth/config.toml` (missing file is ignored).
    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                settings.merge_from(&toml_settings);
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    pub(crate) fn build(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::resolve(settings)?,
            database: DatabaseConfig::resolve(settings)?,
            chain: ChainConfig::resolve(settings)?,
            auth: AuthConfig::resolve(settings)?,
        })
    }
}
