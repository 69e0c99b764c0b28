//! Commission audit trail: typed field-level diffs.
//!
//! Every transition that mutates a commission appends one history row holding
//! only the fields that changed. A change is a ([`HistoryField`], old
//! [`FieldValue`], new [`FieldValue`]) triple. The persisted form is two JSON
//! objects (`old_data`, `new_data`) keyed by field name, each value tagged with
//! its kind so it can be decoded back into the same typed change.
//!
//! JSON written by this crate is canonical (keys sorted recursively) so the
//! same diff always produces the same bytes.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use esc_schemas::{CommissionStatus, HistoryAction, OrderStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// One side of a field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Field absent on this side (e.g. first upload of a receipt).
    Null,
    Text(String),
    Integer(i64),
    /// Settlement-currency minor units.
    Amount(i64),
    /// 1e-6 fixed point (unit price, FX rate).
    Micros(i64),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn opt_text(s: Option<&str>) -> Self {
        s.map_or(FieldValue::Null, |v| FieldValue::Text(v.to_string()))
    }

    pub fn opt_amount(v: Option<i64>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Amount)
    }

    pub fn opt_integer(v: Option<i64>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Integer)
    }

    pub fn opt_date(v: Option<NaiveDate>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Date)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<CommissionStatus> for FieldValue {
    fn from(s: CommissionStatus) -> Self {
        FieldValue::Text(s.as_str().to_string())
    }
}

impl From<OrderStatus> for FieldValue {
    fn from(s: OrderStatus) -> Self {
        FieldValue::Text(s.as_str().to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

// ---------------------------------------------------------------------------
// HistoryField
// ---------------------------------------------------------------------------

/// Every field a history row may mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HistoryField {
    ServiceCode,
    Title,
    Description,
    Category,
    Location,
    ImageRef,
    Price,
    Quantity,
    Currency,
    FxRate,
    Fee,
    EscrowAmount,
    Deadline,
    Status,
    PlaceId,
    OrderId,
    OrderStatus,
    Fulfiller,
    ReceiptRef,
    ReceiptAmount,
    ReceiptDate,
    Remark,
    LogisticsName,
    TrackingNumber,
    ShippedAt,
    Payout,
    FeeKept,
    Refund,
    Reason,
}

impl HistoryField {
    pub const ALL: [HistoryField; 29] = [
        HistoryField::ServiceCode,
        HistoryField::Title,
        HistoryField::Description,
        HistoryField::Category,
        HistoryField::Location,
        HistoryField::ImageRef,
        HistoryField::Price,
        HistoryField::Quantity,
        HistoryField::Currency,
        HistoryField::FxRate,
        HistoryField::Fee,
        HistoryField::EscrowAmount,
        HistoryField::Deadline,
        HistoryField::Status,
        HistoryField::PlaceId,
        HistoryField::OrderId,
        HistoryField::OrderStatus,
        HistoryField::Fulfiller,
        HistoryField::ReceiptRef,
        HistoryField::ReceiptAmount,
        HistoryField::ReceiptDate,
        HistoryField::Remark,
        HistoryField::LogisticsName,
        HistoryField::TrackingNumber,
        HistoryField::ShippedAt,
        HistoryField::Payout,
        HistoryField::FeeKept,
        HistoryField::Refund,
        HistoryField::Reason,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryField::ServiceCode => "service_code",
            HistoryField::Title => "title",
            HistoryField::Description => "description",
            HistoryField::Category => "category",
            HistoryField::Location => "location",
            HistoryField::ImageRef => "image_ref",
            HistoryField::Price => "price",
            HistoryField::Quantity => "quantity",
            HistoryField::Currency => "currency",
            HistoryField::FxRate => "fx_rate",
            HistoryField::Fee => "fee",
            HistoryField::EscrowAmount => "escrow_amount",
            HistoryField::Deadline => "deadline",
            HistoryField::Status => "status",
            HistoryField::PlaceId => "place_id",
            HistoryField::OrderId => "order_id",
            HistoryField::OrderStatus => "order_status",
            HistoryField::Fulfiller => "fulfiller",
            HistoryField::ReceiptRef => "receipt_ref",
            HistoryField::ReceiptAmount => "receipt_amount",
            HistoryField::ReceiptDate => "receipt_date",
            HistoryField::Remark => "remark",
            HistoryField::LogisticsName => "logistics_name",
            HistoryField::TrackingNumber => "tracking_number",
            HistoryField::ShippedAt => "shipped_at",
            HistoryField::Payout => "payout",
            HistoryField::FeeKept => "fee_kept",
            HistoryField::Refund => "refund",
            HistoryField::Reason => "reason",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| anyhow!("unknown history field: {}", s))
    }
}

impl std::fmt::Display for HistoryField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HistoryDiff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: HistoryField,
    pub old: FieldValue,
    pub new: FieldValue,
}

/// Ordered set of field changes for one transition. A field appears at most
/// once; unchanged values are never recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryDiff {
    changes: Vec<FieldChange>,
}

impl HistoryDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `field` if `old != new`. A later call for the same field keeps
    /// the first old value and replaces the new one.
    pub fn record(
        &mut self,
        field: HistoryField,
        old: impl Into<FieldValue>,
        new: impl Into<FieldValue>,
    ) -> &mut Self {
        let (old, new) = (old.into(), new.into());
        if let Some(pos) = self.changes.iter().position(|c| c.field == field) {
            if self.changes[pos].old == new {
                self.changes.remove(pos);
            } else {
                self.changes[pos].new = new;
            }
            return self;
        }
        if old != new {
            self.changes.push(FieldChange { field, old, new });
        }
        self
    }

    /// Record a value that did not exist before.
    pub fn set(&mut self, field: HistoryField, new: impl Into<FieldValue>) -> &mut Self {
        self.record(field, FieldValue::Null, new)
    }

    pub fn with(mut self, field: HistoryField, old: impl Into<FieldValue>, new: impl Into<FieldValue>) -> Self {
        self.record(field, old, new);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[FieldChange] {
        &self.changes
    }

    pub fn get(&self, field: HistoryField) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// `(old_data, new_data)` JSON objects. Sides that are `Null` are omitted
    /// from their map, so a pure addition has no entry in `old_data`.
    pub fn to_snapshots(&self) -> Result<(Value, Value)> {
        let mut old = Map::new();
        let mut new = Map::new();
        for c in &self.changes {
            if !c.old.is_null() {
                old.insert(
                    c.field.as_str().to_string(),
                    serde_json::to_value(&c.old).context("serialize old field value")?,
                );
            }
            if !c.new.is_null() {
                new.insert(
                    c.field.as_str().to_string(),
                    serde_json::to_value(&c.new).context("serialize new field value")?,
                );
            }
        }
        Ok((sort_keys(&Value::Object(old)), sort_keys(&Value::Object(new))))
    }

    /// Rebuild a diff from persisted snapshots. Field order follows
    /// [`HistoryField::ALL`].
    pub fn from_snapshots(old: &Value, new: &Value) -> Result<Self> {
        let old = old
            .as_object()
            .ok_or_else(|| anyhow!("old_data must be a JSON object"))?;
        let new = new
            .as_object()
            .ok_or_else(|| anyhow!("new_data must be a JSON object"))?;

        for key in old.keys().chain(new.keys()) {
            HistoryField::parse(key)?;
        }

        let decode = |map: &Map<String, Value>, field: HistoryField| -> Result<FieldValue> {
            match map.get(field.as_str()) {
                None => Ok(FieldValue::Null),
                Some(v) => serde_json::from_value(v.clone())
                    .with_context(|| format!("decode history field {}", field)),
            }
        };

        let mut changes = Vec::new();
        for field in HistoryField::ALL {
            if !old.contains_key(field.as_str()) && !new.contains_key(field.as_str()) {
                continue;
            }
            changes.push(FieldChange {
                field,
                old: decode(old, field)?,
                new: decode(new, field)?,
            });
        }
        Ok(Self { changes })
    }
}

/// One persisted history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub history_id: i64,
    pub commission_id: i64,
    pub action: HistoryAction,
    pub actor_id: String,
    pub diff: HistoryDiff,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Canonical JSON
// ---------------------------------------------------------------------------

/// Compact JSON with object keys sorted recursively.
pub fn canonical_json_string<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize to json value failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

pub fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}
