//! `esc wallet` handlers.

use anyhow::Result;
use esc_engine::CommissionEngine;
use esc_schemas::WalletAccount;

use super::{opt_dt, opt_str};

fn print_account(a: &WalletAccount) {
    println!(
        "user_id={} balance={} escrow_balance={} disabled_until={}",
        a.user_id,
        a.balance,
        a.escrow_balance,
        opt_dt(&a.disabled_until)
    );
}

pub async fn show(engine: &CommissionEngine, user: &str) -> Result<()> {
    let account = engine.wallet(user).await?;
    print_account(&account);
    Ok(())
}

pub async fn deposit(engine: &CommissionEngine, user: &str, amount: i64) -> Result<()> {
    let caller = engine.resolve_caller(user).await?;
    let account = engine.deposit(&caller, amount).await?;
    print_account(&account);
    Ok(())
}

pub async fn withdraw(engine: &CommissionEngine, user: &str, amount: i64) -> Result<()> {
    let caller = engine.resolve_caller(user).await?;
    let account = engine.withdraw(&caller, amount).await?;
    print_account(&account);
    Ok(())
}

pub async fn logs(engine: &CommissionEngine, user: &str, limit: i64) -> Result<()> {
    let entries = engine.wallet_logs(user, limit).await?;
    for e in entries {
        println!(
            "log_id={} action={} amount={} balance={} escrow_balance={} service_code={} created_at={}",
            e.log_id,
            e.action.as_str(),
            e.amount,
            e.balance,
            e.escrow_balance,
            opt_str(&e.service_code),
            e.created_at.to_rfc3339(),
        );
    }
    Ok(())
}
