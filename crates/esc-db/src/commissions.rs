//! Commission rows, including the conditional-update claim.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use esc_schemas::{CommissionRecord, CommissionStatus, PendingReviewItem};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

const COLUMNS: &str = r#"
    c.commission_id, c.service_code, c.requester_id, c.title, c.description,
    c.category, c.location, c.image_ref, c.price_micros, c.quantity, c.currency,
    c.fx_rate_micros, c.fee, c.escrow_amount, c.deadline, c.status, c.place_id,
    c.created_at, c.updated_at
"#;

pub(crate) fn commission_from_row(row: &PgRow) -> Result<CommissionRecord> {
    Ok(CommissionRecord {
        commission_id: row.try_get("commission_id")?,
        service_code: row.try_get("service_code")?,
        requester_id: row.try_get("requester_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        location: row.try_get("location")?,
        image_ref: row.try_get("image_ref")?,
        price_micros: row.try_get("price_micros")?,
        quantity: row.try_get("quantity")?,
        currency: row.try_get("currency")?,
        fx_rate_micros: row.try_get("fx_rate_micros")?,
        fee: row.try_get("fee")?,
        escrow_amount: row.try_get("escrow_amount")?,
        deadline: row.try_get("deadline")?,
        status: CommissionStatus::parse(&row.try_get::<String, _>("status")?)?,
        place_id: row.try_get("place_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct NewCommission {
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
    pub place_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Insert in `PENDING_REVIEW`.
pub async fn insert_commission(conn: &mut PgConnection, c: &NewCommission) -> Result<CommissionRecord> {
    let sql = format!(
        r#"
        insert into commissions as c (
          service_code, requester_id, title, description, category, location,
          image_ref, price_micros, quantity, currency, fx_rate_micros, fee,
          escrow_amount, deadline, status, place_id, created_at, updated_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17
        )
        returning {COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(&c.service_code)
        .bind(&c.requester_id)
        .bind(&c.title)
        .bind(&c.description)
        .bind(&c.category)
        .bind(&c.location)
        .bind(&c.image_ref)
        .bind(c.price_micros)
        .bind(c.quantity)
        .bind(&c.currency)
        .bind(c.fx_rate_micros)
        .bind(c.fee)
        .bind(c.escrow_amount)
        .bind(c.deadline)
        .bind(CommissionStatus::PendingReview.as_str())
        .bind(c.place_id)
        .bind(c.created_at)
        .fetch_one(conn)
        .await
        .context("insert_commission failed")?;
    commission_from_row(&row)
}

pub async fn fetch_by_code(conn: &mut PgConnection, service_code: &str) -> Result<Option<CommissionRecord>> {
    let sql = format!("select {COLUMNS} from commissions c where c.service_code = $1");
    let row = sqlx::query(&sql)
        .bind(service_code)
        .fetch_optional(conn)
        .await
        .context("fetch_by_code failed")?;
    row.as_ref().map(commission_from_row).transpose()
}

pub async fn fetch_by_id(conn: &mut PgConnection, commission_id: i64) -> Result<Option<CommissionRecord>> {
    let sql = format!("select {COLUMNS} from commissions c where c.commission_id = $1");
    let row = sqlx::query(&sql)
        .bind(commission_id)
        .fetch_optional(conn)
        .await
        .context("fetch_by_id failed")?;
    row.as_ref().map(commission_from_row).transpose()
}

/// Load and row-lock a commission until the transaction ends.
pub async fn lock_by_code(conn: &mut PgConnection, service_code: &str) -> Result<Option<CommissionRecord>> {
    let sql = format!("select {COLUMNS} from commissions c where c.service_code = $1 for update");
    let row = sqlx::query(&sql)
        .bind(service_code)
        .fetch_optional(conn)
        .await
        .context("lock_by_code failed")?;
    row.as_ref().map(commission_from_row).transpose()
}

/// Persist every mutable column of a commission loaded with [`lock_by_code`].
pub async fn store_commission(conn: &mut PgConnection, c: &CommissionRecord) -> Result<()> {
    sqlx::query(
        r#"
        update commissions
        set title = $2,
            description = $3,
            category = $4,
            location = $5,
            image_ref = $6,
            price_micros = $7,
            quantity = $8,
            currency = $9,
            fx_rate_micros = $10,
            fee = $11,
            escrow_amount = $12,
            deadline = $13,
            status = $14,
            place_id = $15,
            updated_at = $16
        where commission_id = $1
        "#,
    )
    .bind(c.commission_id)
    .bind(&c.title)
    .bind(&c.description)
    .bind(&c.category)
    .bind(&c.location)
    .bind(&c.image_ref)
    .bind(c.price_micros)
    .bind(c.quantity)
    .bind(&c.currency)
    .bind(c.fx_rate_micros)
    .bind(c.fee)
    .bind(c.escrow_amount)
    .bind(c.deadline)
    .bind(c.status.as_str())
    .bind(c.place_id)
    .bind(c.updated_at)
    .execute(conn)
    .await
    .context("store_commission failed")?;
    Ok(())
}

/// Set `image_ref` to `replacement` if it still equals `expected`
/// (post-commit cleanup when the file write failed).
pub async fn swap_image_ref(
    conn: &mut PgConnection,
    commission_id: i64,
    expected: &str,
    replacement: Option<&str>,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update commissions
        set image_ref = $3
        where commission_id = $1 and image_ref = $2
        "#,
    )
    .bind(commission_id)
    .bind(expected)
    .bind(replacement)
    .execute(conn)
    .await
    .context("swap_image_ref failed")?;
    Ok(res.rows_affected() == 1)
}

/// Claim an OPEN commission for `claimant` in one conditional statement.
///
/// Exactly one concurrent caller gets `Some(row)`; every other one sees zero
/// rows affected and gets `None`. The requester can never claim their own
/// commission.
pub async fn claim_open(
    conn: &mut PgConnection,
    service_code: &str,
    claimant: &str,
    now: DateTime<Utc>,
) -> Result<Option<CommissionRecord>> {
    let sql = format!(
        r#"
        update commissions as c
        set status = 'CLAIMED',
            updated_at = $3
        where c.service_code = $1
          and c.status = 'OPEN'
          and c.requester_id <> $2
        returning {COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(service_code)
        .bind(claimant)
        .bind(now)
        .fetch_optional(conn)
        .await
        .context("claim_open failed")?;
    row.as_ref().map(commission_from_row).transpose()
}

pub async fn delete_commission(conn: &mut PgConnection, commission_id: i64) -> Result<u64> {
    let res = sqlx::query("delete from commissions where commission_id = $1")
        .bind(commission_id)
        .execute(conn)
        .await
        .context("delete_commission failed")?;
    Ok(res.rows_affected())
}

/// Moderation queue, oldest first, each with the reason of its most recent
/// failed review (if it was rejected and re-edited).
pub async fn list_pending_review(conn: &mut PgConnection, limit: i64) -> Result<Vec<PendingReviewItem>> {
    let sql = format!(
        r#"
        select {COLUMNS},
          (select r.reason
             from reviews r
            where r.target_type = 'commission'
              and r.target_id = c.commission_id
              and r.result = 'FAIL'
            order by r.created_at desc, r.review_id desc
            limit 1) as latest_fail_reason
        from commissions c
        where c.status = 'PENDING_REVIEW'
        order by c.created_at asc, c.commission_id asc
        limit $1
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .fetch_all(conn)
        .await
        .context("list_pending_review failed")?;

    rows.iter()
        .map(|row| -> Result<PendingReviewItem> {
            Ok(PendingReviewItem {
                commission: commission_from_row(row)?,
                latest_fail_reason: row.try_get("latest_fail_reason")?,
            })
        })
        .collect()
}

/// Commissions a requester still has in flight (not completed or cancelled),
/// newest first.
pub async fn list_active_for_requester(
    conn: &mut PgConnection,
    requester_id: &str,
) -> Result<Vec<CommissionRecord>> {
    let sql = format!(
        r#"
        select {COLUMNS}
        from commissions c
        where c.requester_id = $1
          and c.status not in ('COMPLETED', 'CANCELLED')
        order by c.created_at desc, c.commission_id desc
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(requester_id)
        .fetch_all(conn)
        .await
        .context("list_active_for_requester failed")?;
    rows.iter().map(commission_from_row).collect()
}

/// Number of commissions referencing `place_id`.
pub async fn count_place_refs(conn: &mut PgConnection, place_id: i64) -> Result<i64> {
    let (n,): (i64,) =
        sqlx::query_as("select count(*)::bigint from commissions where place_id = $1")
            .bind(place_id)
            .fetch_one(conn)
            .await
            .context("count_place_refs failed")?;
    Ok(n)
}
