//! Typed engine settings read from the merged config JSON.
//!
//! Every key is optional; absent keys take the defaults below. Keys that are
//! present but of the wrong type are errors, never silently defaulted.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use esc_ledger::{Micros, BPS_SCALE};
use serde_json::Value;

/// JSON pointers read by [`EscrowSettings::from_config_json`] and by
/// [`crate::secrets`]. Used by the unused-key report.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/database/url_env",
    "/database/max_connections",
    "/database/lock_timeout_ms",
    "/pricing/fee_rate_bps",
    "/pricing/settlement_currency",
    "/pricing/fx_rates",
    "/commission/deadline_grace_days",
    "/commission/code_utc_offset_minutes",
    "/moderation/fail_threshold",
    "/moderation/fail_window_days",
    "/moderation/suspension_days",
    "/storage/root",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub max_connections: u32,
    /// Applied with `SET LOCAL lock_timeout` in every engine transaction.
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingSettings {
    pub fee_rate_bps: i64,
    pub settlement_currency: String,
    /// Settlement-currency value of one unit of each quoting currency.
    pub fx_rates: BTreeMap<String, Micros>,
}

impl PricingSettings {
    pub fn fx_rate(&self, currency: &str) -> Option<Micros> {
        self.fx_rates.get(currency).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionSettings {
    /// Days added to the supplied deadline on create and on edit.
    pub deadline_grace_days: i64,
    /// Offset of the clock used for the `YYYYMM` part of service codes.
    pub code_utc_offset_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationSettings {
    pub fail_threshold: i64,
    pub fail_window_days: i64,
    pub suspension_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowSettings {
    pub database: DatabaseSettings,
    pub pricing: PricingSettings,
    pub commission: CommissionSettings,
    pub moderation: ModerationSettings,
    pub storage: StorageSettings,
}

impl Default for EscrowSettings {
    fn default() -> Self {
        let fx_rates = [
            ("TWD", Micros::ONE),
            ("JPY", Micros::new(201_000)),
            ("USD", Micros::new(32_500_000)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            database: DatabaseSettings {
                max_connections: 10,
                lock_timeout_ms: 5_000,
            },
            pricing: PricingSettings {
                fee_rate_bps: 1_000,
                settlement_currency: "TWD".to_string(),
                fx_rates,
            },
            commission: CommissionSettings {
                deadline_grace_days: 7,
                code_utc_offset_minutes: 480,
            },
            moderation: ModerationSettings {
                fail_threshold: 5,
                fail_window_days: 30,
                suspension_days: 7,
            },
            storage: StorageSettings {
                root: PathBuf::from("var/uploads"),
            },
        }
    }
}

fn int_at(config: &Value, pointer: &str) -> Result<Option<i64>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| anyhow!("CONFIG_TYPE_MISMATCH {}: expected integer", pointer)),
    }
}

fn str_at(config: &Value, pointer: &str) -> Result<Option<String>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => bail!("CONFIG_TYPE_MISMATCH {}: expected string", pointer),
    }
}

fn non_negative(pointer: &str, v: i64) -> Result<i64> {
    if v < 0 {
        bail!("CONFIG_OUT_OF_RANGE {}: must be >= 0, got {}", pointer, v);
    }
    Ok(v)
}

impl EscrowSettings {
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let mut s = Self::default();

        if let Some(v) = int_at(config, "/database/max_connections")? {
            s.database.max_connections = u32::try_from(v)
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    anyhow!("CONFIG_OUT_OF_RANGE /database/max_connections: got {}", v)
                })?;
        }
        if let Some(v) = int_at(config, "/database/lock_timeout_ms")? {
            s.database.lock_timeout_ms = non_negative("/database/lock_timeout_ms", v)? as u64;
        }

        if let Some(v) = int_at(config, "/pricing/fee_rate_bps")? {
            if !(0..=BPS_SCALE).contains(&v) {
                bail!(
                    "CONFIG_OUT_OF_RANGE /pricing/fee_rate_bps: must be within 0..={}, got {}",
                    BPS_SCALE,
                    v
                );
            }
            s.pricing.fee_rate_bps = v;
        }
        if let Some(v) = str_at(config, "/pricing/settlement_currency")? {
            s.pricing.settlement_currency = v.to_ascii_uppercase();
        }
        match config.pointer("/pricing/fx_rates") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                let mut rates = BTreeMap::new();
                for (code, raw) in map {
                    // Numbers are accepted for convenience; strings keep exact decimals.
                    let text = match raw {
                        Value::String(t) => t.clone(),
                        Value::Number(n) => n.to_string(),
                        _ => bail!("CONFIG_TYPE_MISMATCH /pricing/fx_rates/{}: expected decimal", code),
                    };
                    let rate = Micros::parse_decimal(&text)
                        .filter(|r| r.is_positive())
                        .ok_or_else(|| {
                            anyhow!("CONFIG_OUT_OF_RANGE /pricing/fx_rates/{}: '{}'", code, text)
                        })?;
                    rates.insert(code.to_ascii_uppercase(), rate);
                }
                s.pricing.fx_rates = rates;
            }
            Some(_) => bail!("CONFIG_TYPE_MISMATCH /pricing/fx_rates: expected mapping"),
        }
        match s.pricing.fx_rate(&s.pricing.settlement_currency) {
            Some(r) if r == Micros::ONE => {}
            _ => bail!(
                "CONFIG_INVALID: settlement currency {} must have fx rate 1",
                s.pricing.settlement_currency
            ),
        }

        if let Some(v) = int_at(config, "/commission/deadline_grace_days")? {
            s.commission.deadline_grace_days = non_negative("/commission/deadline_grace_days", v)?;
        }
        if let Some(v) = int_at(config, "/commission/code_utc_offset_minutes")? {
            if !(-14 * 60..=14 * 60).contains(&v) {
                bail!("CONFIG_OUT_OF_RANGE /commission/code_utc_offset_minutes: got {}", v);
            }
            s.commission.code_utc_offset_minutes = v as i32;
        }

        if let Some(v) = int_at(config, "/moderation/fail_threshold")? {
            if v < 1 {
                bail!("CONFIG_OUT_OF_RANGE /moderation/fail_threshold: must be >= 1, got {}", v);
            }
            s.moderation.fail_threshold = v;
        }
        if let Some(v) = int_at(config, "/moderation/fail_window_days")? {
            s.moderation.fail_window_days = non_negative("/moderation/fail_window_days", v)?;
        }
        if let Some(v) = int_at(config, "/moderation/suspension_days")? {
            s.moderation.suspension_days = non_negative("/moderation/suspension_days", v)?;
        }

        if let Some(v) = str_at(config, "/storage/root")? {
            if v.is_empty() {
                bail!("CONFIG_OUT_OF_RANGE /storage/root: must not be empty");
            }
            s.storage.root = PathBuf::from(v);
        }

        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_yields_defaults() {
        let s = EscrowSettings::from_config_json(&json!({})).unwrap();
        assert_eq!(s, EscrowSettings::default());
        assert_eq!(s.pricing.fx_rate("JPY"), Some(Micros::new(201_000)));
        assert_eq!(s.pricing.fx_rate("EUR"), None);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = json!({
            "pricing": {"fee_rate_bps": 500, "fx_rates": {"twd": "1", "usd": 31.25}},
            "moderation": {"fail_threshold": 3},
            "storage": {"root": "/srv/uploads"}
        });
        let s = EscrowSettings::from_config_json(&cfg).unwrap();
        assert_eq!(s.pricing.fee_rate_bps, 500);
        assert_eq!(s.pricing.fx_rate("USD"), Some(Micros::new(31_250_000)));
        assert_eq!(s.pricing.fx_rate("JPY"), None, "fx_rates replaces the whole table");
        assert_eq!(s.moderation.fail_threshold, 3);
        assert_eq!(s.storage.root, PathBuf::from("/srv/uploads"));
    }

    #[test]
    fn wrong_types_are_errors_not_defaults() {
        let err = EscrowSettings::from_config_json(&json!({"pricing": {"fee_rate_bps": "ten"}}))
            .unwrap_err();
        assert!(err.to_string().contains("CONFIG_TYPE_MISMATCH"));
    }

    #[test]
    fn settlement_currency_must_be_unit_rate() {
        let cfg = json!({"pricing": {"settlement_currency": "USD"}});
        let err = EscrowSettings::from_config_json(&cfg).unwrap_err();
        assert!(err.to_string().contains("settlement currency USD"));
    }

    #[test]
    fn out_of_range_values_rejected() {
        for cfg in [
            json!({"pricing": {"fee_rate_bps": 10_001}}),
            json!({"moderation": {"fail_threshold": 0}}),
            json!({"database": {"max_connections": 0}}),
            json!({"pricing": {"fx_rates": {"TWD": "1", "JPY": "-0.2"}}}),
        ] {
            assert!(EscrowSettings::from_config_json(&cfg).is_err(), "{cfg}");
        }
    }
}
