//! Commission lifecycle transitions.
//!
//! Pure: given the persisted status and an event, return the status the
//! commission moves to or a [`TransitionError`]. Callers load the row under
//! lock, check here, then apply side effects in the same transaction.

use esc_schemas::CommissionStatus;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommissionEvent {
    Approve,
    Reject,
    Edit,
    Claim,
    UploadReceipt,
    Ship,
    Complete,
    Cancel,
    Delete,
}

impl CommissionEvent {
    pub const ALL: [CommissionEvent; 9] = [
        CommissionEvent::Approve,
        CommissionEvent::Reject,
        CommissionEvent::Edit,
        CommissionEvent::Claim,
        CommissionEvent::UploadReceipt,
        CommissionEvent::Ship,
        CommissionEvent::Complete,
        CommissionEvent::Cancel,
        CommissionEvent::Delete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CommissionEvent::Approve => "Approve",
            CommissionEvent::Reject => "Reject",
            CommissionEvent::Edit => "Edit",
            CommissionEvent::Claim => "Claim",
            CommissionEvent::UploadReceipt => "UploadReceipt",
            CommissionEvent::Ship => "Ship",
            CommissionEvent::Complete => "Complete",
            CommissionEvent::Cancel => "Cancel",
            CommissionEvent::Delete => "Delete",
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Returned when an event is not valid in the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: CommissionStatus,
    pub event: CommissionEvent,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} is not allowed while commission is {}",
            self.event.name(),
            self.from.as_str()
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Status after `event`. `Delete` returns the current status unchanged: the
/// row is removed rather than moved.
pub fn next_status(
    from: CommissionStatus,
    event: CommissionEvent,
) -> Result<CommissionStatus, TransitionError> {
    use CommissionEvent as E;
    use CommissionStatus as S;

    let next = match (from, event) {
        (S::PendingReview, E::Approve) => S::Open,
        (S::PendingReview, E::Reject) => S::Rejected,
        (S::PendingReview | S::Rejected, E::Edit) => S::PendingReview,
        (S::Open, E::Claim) => S::Claimed,
        (S::Claimed | S::Shipping, E::UploadReceipt) => S::Shipping,
        (S::Shipping | S::Shipped, E::Ship) => S::Shipped,
        (S::Shipped, E::Complete) => S::Completed,
        (S::Shipped, E::Cancel) => S::Cancelled,
        (S::PendingReview | S::Open, E::Delete) => from,
        _ => return Err(TransitionError { from, event }),
    };
    Ok(next)
}

pub fn check(from: CommissionStatus, event: CommissionEvent) -> Result<(), TransitionError> {
    next_status(from, event).map(|_| ())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
