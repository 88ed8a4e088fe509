//! HTTP gateway over the authority service.

pub mod auth;
pub mod error;
pub mod server;
pub mod types;

pub use server::{GatewayState, router, start_server};
