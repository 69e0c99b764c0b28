//! Fixed-point money types.
//!
//! # Scales
//!
//! - [`Micros`]: 1e-6 fixed point stored as `i64`. Used for per-unit prices in
//!   the requester's quoting currency and for FX rates
//!   (`1 JPY = 0.201 TWD` is `Micros::new(201_000)`).
//! - [`Money`]: integer count of settlement-currency minor units. Balances,
//!   fees, escrow amounts and wallet log amounts all use this scale.
//!
//! Neither type implements `From<i64>`; callers must be deliberate about when a
//! raw integer represents a monetary amount.
//!
//! # Arithmetic
//!
//! `Add`, `Sub`, `Neg`, `AddAssign`, `SubAssign` are closed over each type and
//! follow Rust's integer overflow semantics. Conversions between scales go
//! through [`round_half_away_from_zero`].

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Number of micros in one whole unit.
pub const MICROS_SCALE: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Micros
// ---------------------------------------------------------------------------

/// A 1e-6 fixed-point amount (unit price or rate).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Micros(i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);
    pub const ONE: Micros = Micros(MICROS_SCALE);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Whole units, e.g. `Micros::from_units(333)` is 333.000000.
    pub fn from_units(units: i64) -> Option<Micros> {
        units.checked_mul(MICROS_SCALE).map(Micros)
    }

    /// Parse a plain decimal string (`"32.5"`, `"-0.201"`, `"7"`).
    ///
    /// At most six fractional digits are accepted; exponents, separators and
    /// surrounding garbage are rejected.
    pub fn parse_decimal(s: &str) -> Option<Micros> {
        let t = s.trim();
        let (neg, body) = match t.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, t.strip_prefix('+').unwrap_or(t)),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if frac_part.len() > 6 {
            return None;
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let mut frac: i64 = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse().ok()?
        };
        for _ in frac_part.len()..6 {
            frac *= 10;
        }

        let raw = whole.checked_mul(MICROS_SCALE)?.checked_add(frac)?;
        Some(Micros(if neg { -raw } else { raw }))
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / MICROS_SCALE;
        let frac = (self.0 % MICROS_SCALE).abs();
        // Between -1 and 0 the integer part truncates to 0 and drops the sign.
        if self.0 < 0 && whole == 0 {
            write!(f, "-{whole}.{frac:06}")
        } else {
            write!(f, "{whole}.{frac:06}")
        }
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Settlement-currency minor units.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Money(raw)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }
}

impl Add for Money {
    type Output = Money;
    #[inline]
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    #[inline]
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    #[inline]
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Rounding
// ---------------------------------------------------------------------------

/// `numerator / denominator` rounded half away from zero.
///
/// `denominator` must be non-zero.
pub fn round_half_away_from_zero(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator != 0, "denominator must be non-zero");
    let q = numerator / denominator;
    let r = numerator % denominator;
    if r.abs() * 2 >= denominator.abs() {
        let sign = if (numerator < 0) == (denominator < 0) { 1 } else { -1 };
        q + sign
    } else {
        q
    }
}
