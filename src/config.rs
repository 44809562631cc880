// src/config.rs

//! Configuration and credential loading.
//!
//! Credentials live outside `config.toml`: each is read from the file named
//! in `[bot]`, and an environment variable overrides the file when set.

use std::fmt;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{BotConfig, Config};

/// Environment override for the bot token.
pub const TOKEN_ENV: &str = "BOUNTYWATCH_TOKEN";

/// Environment override for the subscription secret.
pub const SECRET_ENV: &str = "BOUNTYWATCH_SECRET";

/// Bot token and shared subscription secret.
#[derive(Clone)]
pub struct Credentials {
    pub token: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Load configuration from a TOML file and validate it.
///
/// A missing or unreadable file falls back to defaults. The reason is handed
/// back rather than logged, since the logger is configured from the result.
/// Invalid values are an error.
pub fn read_config(path: &Path) -> Result<(Config, Option<AppError>)> {
    let (config, fallback) = Config::load_or_default(path);
    config.validate()?;
    Ok((config, fallback))
}

/// Read the bot token and secret, preferring environment overrides.
pub fn load_credentials(bot: &BotConfig) -> Result<Credentials> {
    Ok(Credentials {
        token: read_credential(TOKEN_ENV, &bot.token_file)?,
        secret: read_credential(SECRET_ENV, &bot.secret_file)?,
    })
}

fn read_credential(env_key: &str, path: &Path) -> Result<String> {
    if let Ok(value) = std::env::var(env_key) {
        let value = value.trim().to_string();
        if !value.is_empty() {
            return Ok(value);
        }
    }

    let value = std::fs::read_to_string(path).map_err(|e| {
        AppError::config(format!(
            "cannot read {} (set {} instead): {}",
            path.display(),
            env_key,
            e
        ))
    })?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::config(format!("{} is empty", path.display())));
    }
    Ok(value)
}
