//! voteauth: wallet-signature authentication and an admin role cache kept
//! consistent with the admin list of an on-chain voting NFT contract.
//!
//! The server never holds a signing key. Privileged changes (root bootstrap,
//! admin add/remove) are built here as unsigned transactions, signed and
//! broadcast by the caller's wallet, and applied to the local cache only
//! once the receipt confirms them.

pub mod auth;
pub mod bootstrap;
pub mod chain;
pub mod channels;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod privileged;
pub mod roles;
pub mod service;
pub mod settings;
