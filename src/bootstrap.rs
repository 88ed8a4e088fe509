//! Early-startup environment for voteauth.
//!
//! Values needed before settings resolve (most importantly
//! `SESSION_SECRET`) may live in `~/.voteauth/.env`, standard
//! dotenvy format.

use std::path::PathBuf;

/// `~/.voteauth`, falling back to `./.voteauth` without a home directory.
pub fn voteauth_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".voteauth")
}

pub fn voteauth_env_path() -> PathBuf {
    voteauth_base_dir().join(".env")
}

/// Default libSQL database file.
pub fn default_database_path() -> PathBuf {
    voteauth_base_dir().join("voteauth.db")
}

/// Load env vars from `~/.voteauth/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()`. dotenvy never overwrites existing
/// vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.voteauth/.env`
pub fn load_voteauth_env() {
    let path = voteauth_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        eprintln!("Warning: failed to load {}: {}", path.display(), e);
    }
}
