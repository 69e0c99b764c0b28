//! Command handler modules for esc-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod commission;
pub mod review;
pub mod wallet;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use esc_config::{report_unused_keys, EscrowSettings, UnusedKeyPolicy};
use esc_engine::{CommissionEngine, LocalFileStore, NoPlaceLookup};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered config (or defaults when no path is given) and report keys no
/// reader consumes.
pub fn load_settings(config_paths: &[String]) -> Result<(EscrowSettings, Value)> {
    if config_paths.is_empty() {
        return Ok((EscrowSettings::default(), serde_json::json!({})));
    }

    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = esc_config::load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS unused_leaf_keys={}",
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={}", p);
        }
    }

    let settings = loaded.settings()?;
    tracing::debug!(config_hash = %loaded.config_hash, "config loaded");
    Ok((settings, loaded.config_json))
}

/// Engine wired to the configured database, local file storage and no place
/// lookup.
pub async fn build_engine(config_paths: &[String]) -> Result<CommissionEngine> {
    let (settings, config_json) = load_settings(config_paths)?;
    let secrets = esc_config::resolve_secrets(&config_json)?;
    let pool = esc_db::connect(&secrets.database_url, settings.database.max_connections).await?;

    let files = Arc::new(LocalFileStore::new(settings.storage.root.clone()));
    Ok(CommissionEngine::new(
        pool,
        settings,
        files,
        Arc::new(NoPlaceLookup),
    ))
}

pub fn opt_dt(v: &Option<DateTime<Utc>>) -> String {
    v.map(|t| t.to_rfc3339()).unwrap_or_else(|| "NULL".to_string())
}

pub fn opt_str(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("NULL")
}
