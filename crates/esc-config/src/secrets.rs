//! Runtime secret resolution.
//!
//! Config YAML stores env var NAMES only (`database.url_env`); values are read
//! from the process environment once at startup and handed to constructors.
//! `Debug` output redacts every value, and errors name the variable, never its
//! contents.

use anyhow::{bail, Result};
use serde_json::Value;

/// Env var consulted for the database URL when config does not name one.
pub const DEFAULT_DATABASE_URL_ENV: &str = "ESC_DATABASE_URL";

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Name of the env var the URL was read from.
    pub database_url_env: String,
    pub database_url: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url_env", &self.database_url_env)
            .field("database_url", &"<REDACTED>")
            .finish()
    }
}

/// Non-empty trimmed string at `pointer`, if any.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Env var name holding the database URL.
pub fn database_url_env(config_json: &Value) -> String {
    read_str_at(config_json, "/database/url_env")
        .unwrap_or_else(|| DEFAULT_DATABASE_URL_ENV.to_string())
}

/// Resolve secrets from the real process environment.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    resolve_secrets_with(config_json, |name| std::env::var(name).ok())
}

/// Resolve secrets through `lookup` (tests inject a map instead of mutating
/// the process environment).
pub fn resolve_secrets_with<F>(config_json: &Value, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let env_name = database_url_env(config_json);
    let url = match lookup(&env_name) {
        Some(v) if !v.trim().is_empty() => v,
        _ => bail!(
            "SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
            env_name
        ),
    };
    Ok(ResolvedSecrets {
        database_url_env: env_name,
        database_url: url,
    })
}
