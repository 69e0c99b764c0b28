//! Commission quote: converted subtotal, platform fee, escrow total.
//!
//! ```text
//! subtotal_exact = price × quantity × fx_rate
//! fee            = round(subtotal_exact × fee_rate)
//! escrow_amount  = round(subtotal_exact) + fee
//! ```
//!
//! Every rounding is half away from zero to whole settlement minor units.
//! Intermediate products are carried in `i128` at 1e-12 scale so no precision
//! is lost before the single rounding step.

use crate::fixedpoint::{round_half_away_from_zero, Micros, Money, MICROS_SCALE};

/// Basis-point denominator (10_000 bps = 100 %).
pub const BPS_SCALE: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    NonPositivePrice { price_micros: i64 },
    NonPositiveQuantity { quantity: i64 },
    NonPositiveRate { rate_micros: i64 },
    FeeRateOutOfRange { fee_rate_bps: i64 },
    Overflow,
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositivePrice { price_micros } => {
                write!(f, "price must be > 0, got {}", Micros::new(*price_micros))
            }
            Self::NonPositiveQuantity { quantity } => {
                write!(f, "quantity must be > 0, got {quantity}")
            }
            Self::NonPositiveRate { rate_micros } => {
                write!(f, "fx rate must be > 0, got {}", Micros::new(*rate_micros))
            }
            Self::FeeRateOutOfRange { fee_rate_bps } => {
                write!(f, "fee rate must be within 0..={BPS_SCALE} bps, got {fee_rate_bps}")
            }
            Self::Overflow => write!(f, "quote overflowed settlement range"),
        }
    }
}

impl std::error::Error for PricingError {}

/// Result of pricing one commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// `round(price × quantity × fx_rate)`.
    pub subtotal: Money,
    pub fee: Money,
    /// Amount held in escrow: `subtotal + fee`.
    pub total: Money,
}

pub fn quote(
    price: Micros,
    quantity: i64,
    fx_rate: Micros,
    fee_rate_bps: i64,
) -> Result<Quote, PricingError> {
    if !price.is_positive() {
        return Err(PricingError::NonPositivePrice {
            price_micros: price.raw(),
        });
    }
    if quantity <= 0 {
        return Err(PricingError::NonPositiveQuantity { quantity });
    }
    if !fx_rate.is_positive() {
        return Err(PricingError::NonPositiveRate {
            rate_micros: fx_rate.raw(),
        });
    }
    if !(0..=BPS_SCALE).contains(&fee_rate_bps) {
        return Err(PricingError::FeeRateOutOfRange { fee_rate_bps });
    }

    let scale = (MICROS_SCALE as i128) * (MICROS_SCALE as i128);

    // 1e-12 scale.
    let subtotal_exact = (price.raw() as i128)
        .checked_mul(quantity as i128)
        .and_then(|v| v.checked_mul(fx_rate.raw() as i128))
        .ok_or(PricingError::Overflow)?;

    let subtotal = round_half_away_from_zero(subtotal_exact, scale);
    let fee = round_half_away_from_zero(
        subtotal_exact
            .checked_mul(fee_rate_bps as i128)
            .ok_or(PricingError::Overflow)?,
        scale * BPS_SCALE as i128,
    );

    let subtotal = i64::try_from(subtotal).map_err(|_| PricingError::Overflow)?;
    let fee = i64::try_from(fee).map_err(|_| PricingError::Overflow)?;
    let total = subtotal.checked_add(fee).ok_or(PricingError::Overflow)?;

    Ok(Quote {
        subtotal: Money::new(subtotal),
        fee: Money::new(fee),
        total: Money::new(total),
    })
}
