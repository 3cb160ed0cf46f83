//! Common test utilities for attachvault integration tests

#[allow(dead_code)]
pub mod config;
#[allow(dead_code)]
pub mod fake_discord;

pub use config::*;
#[allow(unused_imports)]
pub use fake_discord::*;
