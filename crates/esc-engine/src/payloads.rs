//! Typed operation payloads and the validation run before any transaction.

use chrono::{DateTime, NaiveDate, Utc};
use esc_ledger::Micros;
use esc_schemas::{CommissionRecord, FulfilmentItem, OrderRecord, ReviewRecord, ReviewResult};

use crate::error::EngineError;

pub const TITLE_MAX_CHARS: usize = 100;
pub const QUANTITY_MAX: i32 = 9_999;
pub const LOGISTICS_MAX_CHARS: usize = 100;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.bytes.is_empty() {
            return Err(EngineError::validation("image is empty"));
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(EngineError::validation(format!(
                "image exceeds {MAX_IMAGE_BYTES} bytes"
            )));
        }
        Ok(())
    }
}

/// Fields a requester supplies on create, and again in full on edit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub price: Micros,
    pub quantity: i32,
    pub currency: String,
    /// As supplied; the stored deadline adds the configured grace days.
    pub deadline: DateTime<Utc>,
    /// External identifier handed to the place resolver.
    pub place_id: Option<String>,
    /// On edit, `None` keeps the current image.
    pub image: Option<ImageUpload>,
}

impl CommissionDraft {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(EngineError::validation("title is required"));
        }
        if title.chars().count() > TITLE_MAX_CHARS {
            return Err(EngineError::validation(format!(
                "title exceeds {TITLE_MAX_CHARS} characters"
            )));
        }
        if self.location.trim().is_empty() {
            return Err(EngineError::validation("location is required"));
        }
        if !self.price.is_positive() {
            return Err(EngineError::validation(format!(
                "price must be > 0, got {}",
                self.price
            )));
        }
        if !(1..=QUANTITY_MAX).contains(&self.quantity) {
            return Err(EngineError::validation(format!(
                "quantity must be within 1..={QUANTITY_MAX}, got {}",
                self.quantity
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(EngineError::validation("currency is required"));
        }
        if self.deadline.date_naive() <= now.date_naive() {
            return Err(EngineError::validation("deadline must be after today"));
        }
        if let Some(place) = &self.place_id {
            if place.trim().is_empty() {
                return Err(EngineError::validation("place id is empty"));
            }
        }
        if let Some(img) = &self.image {
            img.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptUpload {
    pub image: ImageUpload,
    pub receipt_amount: Option<i64>,
    pub receipt_date: Option<NaiveDate>,
    pub remark: Option<String>,
}

impl ReceiptUpload {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.image.validate()?;
        if matches!(self.receipt_amount, Some(a) if a < 0) {
            return Err(EngineError::validation("receipt amount must be >= 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentInfo {
    pub logistics_name: String,
    pub tracking_number: Option<String>,
    pub remark: Option<String>,
}

impl ShipmentInfo {
    pub fn validate(&self) -> Result<(), EngineError> {
        let name = self.logistics_name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("logistics name is required"));
        }
        if name.chars().count() > LOGISTICS_MAX_CHARS {
            return Err(EngineError::validation(format!(
                "logistics name exceeds {LOGISTICS_MAX_CHARS} characters"
            )));
        }
        if let Some(t) = &self.tracking_number {
            if t.chars().count() > LOGISTICS_MAX_CHARS {
                return Err(EngineError::validation(format!(
                    "tracking number exceeds {LOGISTICS_MAX_CHARS} characters"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDecision {
    pub result: ReviewResult,
    pub reason: Option<String>,
}

impl ReviewDecision {
    pub fn pass() -> Self {
        Self {
            result: ReviewResult::Pass,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            result: ReviewResult::Fail,
            reason: Some(reason.into()),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let has_reason = self.reason.as_deref().is_some_and(|r| !r.trim().is_empty());
        if self.result == ReviewResult::Fail && !has_reason {
            return Err(EngineError::validation("a failed review needs a reason"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of Complete or Cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementOutcome {
    pub commission: CommissionRecord,
    pub order: OrderRecord,
    /// Amount credited to the fulfiller (Complete) or requester (Cancel).
    pub credited: i64,
    pub fee_kept: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub service_code: String,
    pub refunded: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub review: ReviewRecord,
    pub commission: CommissionRecord,
    /// Fail reviews for the requester inside the trailing window, this one
    /// included. Zero for a pass.
    pub recent_fails: i64,
    /// Set when this review put (or kept) the requester under suspension.
    pub suspended_until: Option<DateTime<Utc>>,
}

pub type ClaimOutcome = FulfilmentItem;
