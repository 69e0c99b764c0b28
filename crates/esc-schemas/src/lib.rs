//! Shared record types for the commission escrow engine.
//!
//! Amounts crossing crate boundaries are raw `i64`:
//! - `*_micros` fields are 1e-6 fixed point (unit price, FX rate).
//! - every other amount (`fee`, `escrow_amount`, balances, wallet log amounts)
//!   is an integer count of settlement-currency minor units.
//!
//! `esc-ledger` wraps these in typed newtypes for arithmetic.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CommissionStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a commission. The persisted value is the source of
/// truth for which transitions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    PendingReview,
    Open,
    Claimed,
    Shipping,
    Shipped,
    Completed,
    Cancelled,
    /// Failed moderation. Re-editable back into `PendingReview`.
    Rejected,
}

impl CommissionStatus {
    pub const ALL: [CommissionStatus; 8] = [
        CommissionStatus::PendingReview,
        CommissionStatus::Open,
        CommissionStatus::Claimed,
        CommissionStatus::Shipping,
        CommissionStatus::Shipped,
        CommissionStatus::Completed,
        CommissionStatus::Cancelled,
        CommissionStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::PendingReview => "PENDING_REVIEW",
            CommissionStatus::Open => "OPEN",
            CommissionStatus::Claimed => "CLAIMED",
            CommissionStatus::Shipping => "SHIPPING",
            CommissionStatus::Shipped => "SHIPPED",
            CommissionStatus::Completed => "COMPLETED",
            CommissionStatus::Cancelled => "CANCELLED",
            CommissionStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| anyhow!("invalid commission status: {}", s))
    }

    /// Escrow has been settled; no further transitions exist.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommissionStatus::Completed | CommissionStatus::Cancelled)
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(anyhow!("invalid order status: {}", other)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

// ---------------------------------------------------------------------------
// WalletAction
// ---------------------------------------------------------------------------

/// Kind of balance movement recorded in `wallet_logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletAction {
    Deposit,
    Withdraw,
    /// Funds moved from the requester's balance into a commission's escrow.
    CommissionPay,
    /// Edit changed the total; the delta was held or returned.
    CommissionAdjust,
    /// Escrow minus fee paid out to the fulfiller.
    CommissionIncome,
    /// Escrow returned to the requester on cancellation.
    CommissionRefund,
    /// Escrow returned to the requester when the commission was deleted.
    CommissionDelete,
}

impl WalletAction {
    pub const ALL: [WalletAction; 7] = [
        WalletAction::Deposit,
        WalletAction::Withdraw,
        WalletAction::CommissionPay,
        WalletAction::CommissionAdjust,
        WalletAction::CommissionIncome,
        WalletAction::CommissionRefund,
        WalletAction::CommissionDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletAction::Deposit => "Deposit",
            WalletAction::Withdraw => "Withdraw",
            WalletAction::CommissionPay => "CommissionPay",
            WalletAction::CommissionAdjust => "CommissionAdjust",
            WalletAction::CommissionIncome => "CommissionIncome",
            WalletAction::CommissionRefund => "CommissionRefund",
            WalletAction::CommissionDelete => "CommissionDelete",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| anyhow!("invalid wallet action: {}", s))
    }
}

// ---------------------------------------------------------------------------
// HistoryAction
// ---------------------------------------------------------------------------

/// Transition name stored with every commission history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Create,
    Edit,
    Approve,
    Reject,
    Accept,
    UploadReceipt,
    ReuploadReceipt,
    Ship,
    Reship,
    Complete,
    Cancel,
}

impl HistoryAction {
    pub const ALL: [HistoryAction; 11] = [
        HistoryAction::Create,
        HistoryAction::Edit,
        HistoryAction::Approve,
        HistoryAction::Reject,
        HistoryAction::Accept,
        HistoryAction::UploadReceipt,
        HistoryAction::ReuploadReceipt,
        HistoryAction::Ship,
        HistoryAction::Reship,
        HistoryAction::Complete,
        HistoryAction::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Create => "CREATE",
            HistoryAction::Edit => "EDIT",
            HistoryAction::Approve => "APPROVE",
            HistoryAction::Reject => "REJECT",
            HistoryAction::Accept => "ACCEPT",
            HistoryAction::UploadReceipt => "UPLOAD_RECEIPT",
            HistoryAction::ReuploadReceipt => "REUPLOAD_RECEIPT",
            HistoryAction::Ship => "SHIP",
            HistoryAction::Reship => "RESHIP",
            HistoryAction::Complete => "COMPLETE",
            HistoryAction::Cancel => "CANCEL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| anyhow!("invalid history action: {}", s))
    }
}

// ---------------------------------------------------------------------------
// Review types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewResult {
    Pass,
    Fail,
}

impl ReviewResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewResult::Pass => "PASS",
            ReviewResult::Fail => "FAIL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PASS" => Ok(ReviewResult::Pass),
            "FAIL" => Ok(ReviewResult::Fail),
            other => Err(anyhow!("invalid review result: {}", other)),
        }
    }
}

/// What a review row is about. Only commissions are moderated by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewTarget {
    Commission,
}

impl ReviewTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewTarget::Commission => "commission",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "commission" => Ok(ReviewTarget::Commission),
            other => Err(anyhow!("invalid review target type: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRecord {
    pub commission_id: i64,
    /// `C-YYYYMM-NNNNNN`; immutable once issued.
    pub service_code: String,
    pub requester_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub image_ref: Option<String>,
    pub price_micros: i64,
    pub quantity: i32,
    pub currency: String,
    pub fx_rate_micros: i64,
    pub fee: i64,
    pub escrow_amount: i64,
    pub deadline: DateTime<Utc>,
    pub status: CommissionStatus,
    pub place_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: i64,
    pub commission_id: i64,
    pub fulfiller_id: String,
    pub requester_id: String,
    pub amount: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Wallet state embedded in the user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub user_id: String,
    pub balance: i64,
    pub escrow_balance: i64,
    pub disabled_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLogEntry {
    pub log_id: i64,
    pub user_id: String,
    pub action: WalletAction,
    /// Signed: negative for money leaving the available balance.
    pub amount: i64,
    pub balance: i64,
    pub escrow_balance: i64,
    pub service_code: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub review_id: i64,
    pub target_type: ReviewTarget,
    pub target_id: i64,
    pub reviewer_id: String,
    pub result: ReviewResult,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub place_id: i64,
    pub external_place_id: String,
    pub name: Option<String>,
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub map_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub commission_id: i64,
    pub uploaded_by: String,
    pub receipt_ref: String,
    pub receipt_amount: Option<i64>,
    pub receipt_date: Option<NaiveDate>,
    pub remark: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRecord {
    pub commission_id: i64,
    pub shipped_by: String,
    pub logistics_name: String,
    pub tracking_number: Option<String>,
    pub remark: Option<String>,
    pub shipped_at: DateTime<Utc>,
}

/// One row of the moderation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReviewItem {
    pub commission: CommissionRecord,
    pub latest_fail_reason: Option<String>,
}

/// A commission together with its order, as seen by a fulfiller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfilmentItem {
    pub commission: CommissionRecord,
    pub order: OrderRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_status_codec_round_trips_every_variant() {
        for st in CommissionStatus::ALL {
            assert_eq!(CommissionStatus::parse(st.as_str()).unwrap(), st);
        }
        assert!(CommissionStatus::parse("審核中").is_err());
    }

    #[test]
    fn only_completed_and_cancelled_are_terminal() {
        let terminal: Vec<_> = CommissionStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![CommissionStatus::Completed, CommissionStatus::Cancelled]
        );
        assert!(!CommissionStatus::Rejected.is_terminal());
    }

    #[test]
    fn history_action_names_match_stored_values() {
        assert_eq!(HistoryAction::UploadReceipt.as_str(), "UPLOAD_RECEIPT");
        assert_eq!(HistoryAction::parse("ACCEPT").unwrap(), HistoryAction::Accept);
        assert!(HistoryAction::parse("accept").is_err());
    }

    #[test]
    fn pending_order_is_the_only_open_order_state() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert_eq!(OrderStatus::parse("CANCELLED").unwrap(), OrderStatus::Cancelled);
    }

    #[test]
    fn wallet_action_parse_rejects_unknown() {
        assert_eq!(
            WalletAction::parse("CommissionIncome").unwrap(),
            WalletAction::CommissionIncome
        );
        assert!(WalletAction::parse("Bonus").is_err());
    }
}
