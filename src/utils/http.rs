// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::{BotConfig, SourceConfig};

/// Create the client used for listing fetches.
///
/// The timeout applies per attempt; retries are handled by the fetchers.
pub fn create_source_client(config: &SourceConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .build()?;
    Ok(client)
}

/// Create the client used for the bot API.
///
/// Long polls hold the connection for `poll_timeout_secs`, so the request
/// timeout leaves headroom on top of it.
pub fn create_bot_client(config: &BotConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
        .build()?;
    Ok(client)
}
