//! Config hash is a pure function of the merged settings, independent of key
//! order in the source documents.

use esc_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
database:
  max_connections: 10
  lock_timeout_ms: 5000
pricing:
  fee_rate_bps: 1000
  settlement_currency: "TWD"
  fx_rates:
    TWD: "1"
    JPY: "0.201"
    USD: "32.5"
"#;

const BASE_YAML_REORDERED: &str = r#"
pricing:
  fx_rates:
    USD: "32.5"
    TWD: "1"
    JPY: "0.201"
  settlement_currency: "TWD"
  fee_rate_bps: 1000
database:
  lock_timeout_ms: 5000
  max_connections: 10
"#;

const OVERLAY_YAML: &str = r#"
pricing:
  fee_rate_bps: 800
moderation:
  fail_threshold: 3
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        original.config_hash, reordered.config_hash,
        "reordering keys in YAML must not change the hash"
    );
}

#[test]
fn overlay_overrides_and_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);

    let settings = merged.settings().unwrap();
    assert_eq!(settings.pricing.fee_rate_bps, 800);
    assert_eq!(settings.moderation.fail_threshold, 3);
    assert_eq!(settings.pricing.settlement_currency, "TWD", "untouched keys survive the merge");
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn empty_documents_are_no_ops() {
    let a = load_layered_yaml_from_strings(&["{}"]).unwrap();
    let b = load_layered_yaml_from_strings(&["{}", ""]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}
