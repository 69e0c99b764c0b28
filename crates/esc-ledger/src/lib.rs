//! Money arithmetic, commission pricing and escrow movements.
//!
//! Nothing in this crate performs IO. Callers load and lock the affected rows,
//! apply one of the operations here, then persist the mutated records and the
//! returned [`escrow::Movement`]s in the same transaction.

pub mod escrow;
pub mod fixedpoint;
pub mod pricing;

pub use escrow::{
    adjust_hold, deposit, hold, refund_to_requester, release_to_fulfiller, withdraw, LedgerError,
    Movement, Settlement,
};
pub use fixedpoint::{round_half_away_from_zero, Micros, Money, MICROS_SCALE};
pub use pricing::{quote, PricingError, Quote, BPS_SCALE};
