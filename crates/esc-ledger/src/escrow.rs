//! Escrow ledger operations.
//!
//! Every function here is a pure state transition on entities the caller has
//! already loaded (and locked) inside its transaction. Nothing opens a
//! transaction or performs IO, so operations compose inside the larger
//! commission transitions. Each successful call returns the [`Movement`] the
//! caller must append to the wallet log in the same transaction.
//!
//! Escrow is tracked per commission (`CommissionRecord::escrow_amount`); the
//! user's `escrow_balance` is never touched by these operations.

use esc_schemas::{
    CommissionRecord, CommissionStatus, OrderRecord, OrderStatus, WalletAccount, WalletAction,
};

use crate::fixedpoint::Money;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount for deposit/withdraw/hold must be strictly positive.
    NonPositiveAmount { amount: i64 },
    InsufficientFunds { needed: i64, available: i64 },
    /// Commission escrow is not positive: a duplicate settlement or a bug.
    EscrowEmpty { service_code: String },
    /// Commission has been claimed but no order row exists for it.
    OrderMissing { service_code: String },
    /// The order was already settled; paying out or refunding again is refused.
    OrderSettled {
        service_code: String,
        status: OrderStatus,
    },
    /// The account passed in is not the party entitled to this movement.
    AccountMismatch { expected: String, got: String },
    /// The commission's fee exceeds its escrow.
    FeeExceedsEscrow { fee: i64, escrow: i64 },
    Overflow,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveAmount { amount } => {
                write!(f, "ledger: amount must be > 0, got {amount}")
            }
            Self::InsufficientFunds { needed, available } => write!(
                f,
                "ledger: insufficient funds (needed {needed}, available {available})"
            ),
            Self::EscrowEmpty { service_code } => {
                write!(f, "ledger: escrow for {service_code} is empty")
            }
            Self::OrderMissing { service_code } => {
                write!(f, "ledger: no order exists for {service_code}")
            }
            Self::OrderSettled {
                service_code,
                status,
            } => write!(
                f,
                "ledger: order for {service_code} already settled ({})",
                status.as_str()
            ),
            Self::AccountMismatch { expected, got } => {
                write!(f, "ledger: expected account {expected}, got {got}")
            }
            Self::FeeExceedsEscrow { fee, escrow } => {
                write!(f, "ledger: fee {fee} exceeds escrow {escrow}")
            }
            Self::Overflow => write!(f, "ledger: balance overflow"),
        }
    }
}

impl std::error::Error for LedgerError {}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// One wallet log row to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    pub user_id: String,
    pub action: WalletAction,
    /// Signed; negative when money leaves the available balance.
    pub amount: Money,
    pub balance_after: Money,
    /// Escrow held against the linked commission after the movement, or the
    /// account's own escrow balance for plain deposits and withdrawals.
    pub escrow_after: Money,
    pub service_code: Option<String>,
}

/// Outcome of releasing or refunding a commission's escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub movement: Movement,
    /// Escrow amount before settlement.
    pub escrow: Money,
    /// Amount credited to the receiving account.
    pub credited: Money,
    /// Platform fee kept (zero for refunds).
    pub fee_kept: Money,
}

fn credit(account: &mut WalletAccount, amount: Money) -> Result<Money, LedgerError> {
    let after = Money::new(account.balance)
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;
    account.balance = after.raw();
    Ok(after)
}

fn debit(account: &mut WalletAccount, amount: Money) -> Result<Money, LedgerError> {
    let available = Money::new(account.balance);
    if available < amount {
        return Err(LedgerError::InsufficientFunds {
            needed: amount.raw(),
            available: available.raw(),
        });
    }
    let after = available - amount;
    account.balance = after.raw();
    Ok(after)
}

fn require_positive(amount: Money) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::NonPositiveAmount {
            amount: amount.raw(),
        })
    }
}

fn require_owner(account: &WalletAccount, expected: &str) -> Result<(), LedgerError> {
    if account.user_id == expected {
        Ok(())
    } else {
        Err(LedgerError::AccountMismatch {
            expected: expected.to_string(),
            got: account.user_id.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Plain wallet movements
// ---------------------------------------------------------------------------

pub fn deposit(account: &mut WalletAccount, amount: Money) -> Result<Movement, LedgerError> {
    require_positive(amount)?;
    let balance_after = credit(account, amount)?;
    Ok(Movement {
        user_id: account.user_id.clone(),
        action: WalletAction::Deposit,
        amount,
        balance_after,
        escrow_after: Money::new(account.escrow_balance),
        service_code: None,
    })
}

pub fn withdraw(account: &mut WalletAccount, amount: Money) -> Result<Movement, LedgerError> {
    require_positive(amount)?;
    let balance_after = debit(account, amount)?;
    Ok(Movement {
        user_id: account.user_id.clone(),
        action: WalletAction::Withdraw,
        amount: -amount,
        balance_after,
        escrow_after: Money::new(account.escrow_balance),
        service_code: None,
    })
}

// ---------------------------------------------------------------------------
// Escrow movements
// ---------------------------------------------------------------------------

/// Debit `amount` from the requester's available balance into the escrow of
/// the commission identified by `service_code`.
pub fn hold(
    account: &mut WalletAccount,
    amount: Money,
    service_code: &str,
) -> Result<Movement, LedgerError> {
    require_positive(amount)?;
    let balance_after = debit(account, amount)?;
    Ok(Movement {
        user_id: account.user_id.clone(),
        action: WalletAction::CommissionPay,
        amount: -amount,
        balance_after,
        escrow_after: amount,
        service_code: Some(service_code.to_string()),
    })
}

/// Move the requester's balance so the commission's escrow equals `new_total`.
///
/// A larger total holds the difference (failing on short funds); a smaller one
/// returns it. Returns `None` when the total is unchanged.
pub fn adjust_hold(
    account: &mut WalletAccount,
    commission: &mut CommissionRecord,
    new_total: Money,
) -> Result<Option<Movement>, LedgerError> {
    require_owner(account, &commission.requester_id)?;
    require_positive(new_total)?;

    let old_total = Money::new(commission.escrow_amount);
    let delta = new_total
        .checked_sub(old_total)
        .ok_or(LedgerError::Overflow)?;

    let balance_after = if delta.is_positive() {
        debit(account, delta)?
    } else if delta.is_negative() {
        credit(account, -delta)?
    } else {
        return Ok(None);
    };
    commission.escrow_amount = new_total.raw();

    Ok(Some(Movement {
        user_id: account.user_id.clone(),
        action: WalletAction::CommissionAdjust,
        amount: -delta,
        balance_after,
        escrow_after: new_total,
        service_code: Some(commission.service_code.clone()),
    }))
}

/// Pay `escrow_amount - fee` to the fulfiller and zero the escrow.
///
/// Calling this on an already-zeroed escrow fails with
/// [`LedgerError::EscrowEmpty`], so a duplicate completion cannot pay twice.
pub fn release_to_fulfiller(
    commission: &mut CommissionRecord,
    order: Option<&OrderRecord>,
    fulfiller: &mut WalletAccount,
) -> Result<Settlement, LedgerError> {
    let escrow = Money::new(commission.escrow_amount);
    if !escrow.is_positive() {
        return Err(LedgerError::EscrowEmpty {
            service_code: commission.service_code.clone(),
        });
    }
    let order = order.ok_or_else(|| LedgerError::OrderMissing {
        service_code: commission.service_code.clone(),
    })?;
    if order.status.is_terminal() {
        return Err(LedgerError::OrderSettled {
            service_code: commission.service_code.clone(),
            status: order.status,
        });
    }
    require_owner(fulfiller, &order.fulfiller_id)?;

    let fee = Money::new(commission.fee);
    if fee > escrow || fee.is_negative() {
        return Err(LedgerError::FeeExceedsEscrow {
            fee: fee.raw(),
            escrow: escrow.raw(),
        });
    }
    let payout = escrow - fee;
    let balance_after = credit(fulfiller, payout)?;
    commission.escrow_amount = 0;

    Ok(Settlement {
        movement: Movement {
            user_id: fulfiller.user_id.clone(),
            action: WalletAction::CommissionIncome,
            amount: payout,
            balance_after,
            escrow_after: Money::ZERO,
            service_code: Some(commission.service_code.clone()),
        },
        escrow,
        credited: payout,
        fee_kept: fee,
    })
}

/// Return the full escrow to the requester and zero it.
///
/// A claimed commission must have its order present and not completed. A
/// commission that was never claimed (pending review, open, rejected) has no
/// order; its refund is recorded as a deletion refund.
pub fn refund_to_requester(
    commission: &mut CommissionRecord,
    order: Option<&OrderRecord>,
    requester: &mut WalletAccount,
) -> Result<Settlement, LedgerError> {
    let escrow = Money::new(commission.escrow_amount);
    if !escrow.is_positive() {
        return Err(LedgerError::EscrowEmpty {
            service_code: commission.service_code.clone(),
        });
    }
    require_owner(requester, &commission.requester_id)?;

    let action = match order {
        Some(o) if o.status == OrderStatus::Completed => {
            return Err(LedgerError::OrderSettled {
                service_code: commission.service_code.clone(),
                status: o.status,
            });
        }
        Some(_) => WalletAction::CommissionRefund,
        None if was_claimed(commission.status) => {
            return Err(LedgerError::OrderMissing {
                service_code: commission.service_code.clone(),
            });
        }
        None => WalletAction::CommissionDelete,
    };
    if commission.status == CommissionStatus::Completed {
        return Err(LedgerError::OrderSettled {
            service_code: commission.service_code.clone(),
            status: OrderStatus::Completed,
        });
    }

    let balance_after = credit(requester, escrow)?;
    commission.escrow_amount = 0;

    Ok(Settlement {
        movement: Movement {
            user_id: requester.user_id.clone(),
            action,
            amount: escrow,
            balance_after,
            escrow_after: Money::ZERO,
            service_code: Some(commission.service_code.clone()),
        },
        escrow,
        credited: escrow,
        fee_kept: Money::ZERO,
    })
}

fn was_claimed(status: CommissionStatus) -> bool {
    !matches!(
        status,
        CommissionStatus::PendingReview | CommissionStatus::Open | CommissionStatus::Rejected
    )
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
