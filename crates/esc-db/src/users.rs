//! User rows (wallet embedded) and the wallet log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use esc_schemas::{WalletAccount, WalletAction, WalletLogEntry};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

fn account_from_row(row: &PgRow) -> Result<WalletAccount> {
    Ok(WalletAccount {
        user_id: row.try_get("user_id")?,
        balance: row.try_get("balance")?,
        escrow_balance: row.try_get("escrow_balance")?,
        disabled_until: row.try_get("disabled_until")?,
    })
}

/// Insert a user if absent. Existing rows are left untouched.
pub async fn ensure_user(
    conn: &mut PgConnection,
    user_id: &str,
    display_name: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into users (user_id, display_name)
        values ($1, $2)
        on conflict (user_id) do nothing
        "#,
    )
    .bind(user_id)
    .bind(display_name)
    .execute(conn)
    .await
    .context("ensure_user failed")?;
    Ok(())
}

pub async fn fetch_account(conn: &mut PgConnection, user_id: &str) -> Result<Option<WalletAccount>> {
    let row = sqlx::query(
        r#"
        select user_id, balance, escrow_balance, disabled_until
        from users
        where user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .context("fetch_account failed")?;

    row.as_ref().map(account_from_row).transpose()
}

/// Same as [`fetch_account`] but takes the row lock until the transaction ends.
pub async fn lock_account(conn: &mut PgConnection, user_id: &str) -> Result<Option<WalletAccount>> {
    let row = sqlx::query(
        r#"
        select user_id, balance, escrow_balance, disabled_until
        from users
        where user_id = $1
        for update
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .context("lock_account failed")?;

    row.as_ref().map(account_from_row).transpose()
}

/// Persist balances of an account previously loaded with [`lock_account`].
pub async fn store_balances(conn: &mut PgConnection, account: &WalletAccount) -> Result<()> {
    sqlx::query(
        r#"
        update users
        set balance = $2,
            escrow_balance = $3
        where user_id = $1
        "#,
    )
    .bind(&account.user_id)
    .bind(account.balance)
    .bind(account.escrow_balance)
    .execute(conn)
    .await
    .context("store_balances failed")?;
    Ok(())
}

/// Raise `disabled_until` to `until`; never moves it earlier. Returns the
/// value now stored.
pub async fn suspend_until_at_least(
    conn: &mut PgConnection,
    user_id: &str,
    until: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
        r#"
        update users
        set disabled_until = greatest(coalesce(disabled_until, $2), $2)
        where user_id = $1
        returning disabled_until
        "#,
    )
    .bind(user_id)
    .bind(until)
    .fetch_optional(conn)
    .await
    .context("suspend_until_at_least failed")?;
    Ok(row.and_then(|(v,)| v))
}

fn log_from_row(row: &PgRow) -> Result<WalletLogEntry> {
    Ok(WalletLogEntry {
        log_id: row.try_get("log_id")?,
        user_id: row.try_get("user_id")?,
        action: WalletAction::parse(&row.try_get::<String, _>("action")?)?,
        amount: row.try_get("amount")?,
        balance: row.try_get("balance")?,
        escrow_balance: row.try_get("escrow_balance")?,
        service_code: row.try_get("service_code")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct NewWalletLog {
    pub user_id: String,
    pub action: WalletAction,
    pub amount: i64,
    pub balance: i64,
    pub escrow_balance: i64,
    pub service_code: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_wallet_log(conn: &mut PgConnection, log: &NewWalletLog) -> Result<i64> {
    let (log_id,): (i64,) = sqlx::query_as(
        r#"
        insert into wallet_logs (
          user_id, action, amount, balance, escrow_balance, service_code, description, created_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8
        )
        returning log_id
        "#,
    )
    .bind(&log.user_id)
    .bind(log.action.as_str())
    .bind(log.amount)
    .bind(log.balance)
    .bind(log.escrow_balance)
    .bind(&log.service_code)
    .bind(&log.description)
    .bind(log.created_at)
    .fetch_one(conn)
    .await
    .context("insert_wallet_log failed")?;
    Ok(log_id)
}

/// Newest first.
pub async fn list_wallet_logs(
    conn: &mut PgConnection,
    user_id: &str,
    limit: i64,
) -> Result<Vec<WalletLogEntry>> {
    let rows = sqlx::query(
        r#"
        select log_id, user_id, action, amount, balance, escrow_balance,
               service_code, description, created_at
        from wallet_logs
        where user_id = $1
        order by log_id desc
        limit $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(conn)
    .await
    .context("list_wallet_logs failed")?;

    rows.iter().map(log_from_row).collect()
}

/// Wallet log rows linked to a service code, oldest first.
pub async fn wallet_logs_for_code(
    conn: &mut PgConnection,
    service_code: &str,
) -> Result<Vec<WalletLogEntry>> {
    let rows = sqlx::query(
        r#"
        select log_id, user_id, action, amount, balance, escrow_balance,
               service_code, description, created_at
        from wallet_logs
        where service_code = $1
        order by log_id asc
        "#,
    )
    .bind(service_code)
    .fetch_all(conn)
    .await
    .context("wallet_logs_for_code failed")?;

    rows.iter().map(log_from_row).collect()
}
