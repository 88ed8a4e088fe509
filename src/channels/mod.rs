//! Transport channels that expose the authority service.

pub mod web;
