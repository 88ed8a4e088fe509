//! Compiled contract artifacts (interface description plus bytecode).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ChainError;

#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    /// The JSON ABI array as emitted by solc.
    pub abi: Value,
    pub bytecode: Vec<u8>,
}

impl ContractArtifact {
    /// Parse an ABI JSON document and a hex bytecode string.
    pub fn from_parts(name: &str, abi_json: &str, bytecode_hex: &str) -> Result<Self, ChainError> {
        let abi: Value = serde_json::from_str(abi_json)
            .map_err(|e| ChainError::Artifact(format!("{name}: invalid ABI JSON: {e}")))?;
        if !abi.is_array() {
            return Err(ChainError::Artifact(format!("{name}: ABI must be a JSON array")));
        }
        let trimmed = bytecode_hex.trim();
        let bytecode = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| ChainError::Artifact(format!("{name}: invalid bytecode hex: {e}")))?;
        if bytecode.is_empty() {
            return Err(ChainError::Artifact(format!("{name}: bytecode is empty")));
        }
        Ok(Self {
            name: name.to_string(),
            abi,
            bytecode,
        })
    }

    /// Whether the ABI declares a function named `method`.
    pub fn has_function(&self, method: &str) -> bool {
        self.abi.as_array().is_some_and(|entries| {
            entries.iter().any(|entry| {
                entry.get("type").and_then(Value::as_str) == Some("function")
                    && entry.get("name").and_then(Value::as_str) == Some(method)
            })
        })
    }
}

/// Resolves a contract name to its artifact.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn load(&self, name: &str) -> Result<ContractArtifact, ChainError>;
}

/// Reads `<dir>/<name>.abi` and `<dir>/<name>.bin`.
pub struct DirArtifactLoader {
    dir: PathBuf,
}

impl DirArtifactLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSource for DirArtifactLoader {
    async fn load(&self, name: &str) -> Result<ContractArtifact, ChainError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(ChainError::Artifact(format!("invalid artifact name '{name}'")));
        }
        let abi_path = self.dir.join(format!("{name}.abi"));
        let bin_path = self.dir.join(format!("{name}.bin"));
        let abi = tokio::fs::read_to_string(&abi_path)
            .await
            .map_err(|e| ChainError::Artifact(format!("{}: {e}", abi_path.display())))?;
        let bin = tokio::fs::read_to_string(&bin_path)
            .await
            .map_err(|e| ChainError::Artifact(format!("{}: {e}", bin_path.display())))?;
        ContractArtifact::from_parts(name, &abi, &bin)
    }
}
