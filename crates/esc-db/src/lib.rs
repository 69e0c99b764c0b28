//! Postgres persistence for the commission escrow engine.
//!
//! Row-level functions take `&mut PgConnection` so they run inside whatever
//! transaction the caller opened (`&mut *tx`). None of them commit.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

pub mod commissions;
pub mod fulfilment;
pub mod history;
pub mod orders;
pub mod places;
pub mod reviews;
pub mod sequence;
pub mod users;

pub use commissions::NewCommission;
pub use places::NewPlace;
pub use reviews::NewReview;
pub use sequence::{allocate_code, format_code, month_key};
pub use users::NewWalletLog;

pub const ENV_DB_URL: &str = "ESC_DATABASE_URL";

/// Connect to Postgres using ESC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_commissions_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='commissions'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_commissions_table: exists,
    })
}

/// Open a transaction whose lock waits give up after `lock_timeout_ms`
/// (0 waits forever). The timeout surfaces as SQLSTATE 55P03.
pub async fn begin(pool: &PgPool, lock_timeout_ms: u64) -> Result<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    // SET does not accept bind parameters; the value is a formatted integer.
    sqlx::query(&format!("set local lock_timeout = {}", lock_timeout_ms))
        .execute(&mut *tx)
        .await
        .context("set lock_timeout failed")?;
    Ok(tx)
}

/// Postgres SQLSTATE of a database error, if any.
pub fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Detect a Postgres unique constraint violation by name.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
