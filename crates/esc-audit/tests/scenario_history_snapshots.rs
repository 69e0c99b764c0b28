//! A history row written as JSONB snapshots reads back as the same typed diff.

use chrono::{TimeZone, Utc};
use esc_audit::{FieldValue, HistoryDiff, HistoryField};
use esc_schemas::CommissionStatus;

#[test]
fn edit_diff_survives_persisted_form() {
    let old_deadline = Utc.with_ymd_and_hms(2026, 11, 8, 0, 0, 0).unwrap();
    let new_deadline = Utc.with_ymd_and_hms(2026, 11, 15, 0, 0, 0).unwrap();

    let diff = HistoryDiff::new()
        .with(HistoryField::Price, FieldValue::Micros(333_000_000), FieldValue::Micros(400_000_000))
        .with(HistoryField::Fee, FieldValue::Amount(100), FieldValue::Amount(120))
        .with(HistoryField::EscrowAmount, FieldValue::Amount(1_099), FieldValue::Amount(1_320))
        .with(HistoryField::Deadline, old_deadline, new_deadline)
        .with(
            HistoryField::Status,
            CommissionStatus::Rejected,
            CommissionStatus::PendingReview,
        )
        .with(HistoryField::ImageRef, FieldValue::Null, FieldValue::text("img/abc.png"));

    let (old, new) = diff.to_snapshots().unwrap();
    assert!(old.get("image_ref").is_none(), "null side must be omitted");
    assert_eq!(new["fee"]["value"], 120);

    let back = HistoryDiff::from_snapshots(&old, &new).unwrap();
    assert_eq!(back.len(), diff.len());
    for change in diff.changes() {
        assert_eq!(back.get(change.field), Some(change), "field {}", change.field);
    }
}

#[test]
fn non_object_snapshot_is_an_error() {
    let err = HistoryDiff::from_snapshots(&serde_json::json!([]), &serde_json::json!({})).unwrap_err();
    assert!(err.to_string().contains("old_data"));
}
