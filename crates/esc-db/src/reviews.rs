//! Moderation decisions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use esc_schemas::{ReviewRecord, ReviewResult, ReviewTarget};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

#[derive(Debug, Clone)]
pub struct NewReview {
    pub target_type: ReviewTarget,
    pub target_id: i64,
    /// Owner of the target; kept on the row so counts outlive the target.
    pub requester_id: String,
    pub reviewer_id: String,
    pub result: ReviewResult,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn review_from_row(row: &PgRow) -> Result<ReviewRecord> {
    Ok(ReviewRecord {
        review_id: row.try_get("review_id")?,
        target_type: ReviewTarget::parse(&row.try_get::<String, _>("target_type")?)?,
        target_id: row.try_get("target_id")?,
        reviewer_id: row.try_get("reviewer_id")?,
        result: ReviewResult::parse(&row.try_get::<String, _>("result")?)?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_review(conn: &mut PgConnection, r: &NewReview) -> Result<ReviewRecord> {
    let row = sqlx::query(
        r#"
        insert into reviews (target_type, target_id, requester_id, reviewer_id, result, reason, created_at)
        values ($1, $2, $3, $4, $5, $6, $7)
        returning review_id, target_type, target_id, reviewer_id, result, reason, created_at
        "#,
    )
    .bind(r.target_type.as_str())
    .bind(r.target_id)
    .bind(&r.requester_id)
    .bind(&r.reviewer_id)
    .bind(r.result.as_str())
    .bind(&r.reason)
    .bind(r.created_at)
    .fetch_one(conn)
    .await
    .context("insert_review failed")?;
    review_from_row(&row)
}

/// FAIL reviews since `since` on commissions of `requester_id`, including
/// commissions deleted since.
pub async fn count_recent_fails(
    conn: &mut PgConnection,
    requester_id: &str,
    since: DateTime<Utc>,
) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint
        from reviews r
        where r.requester_id = $1
          and r.target_type = 'commission'
          and r.result = 'FAIL'
          and r.created_at >= $2
        "#,
    )
    .bind(requester_id)
    .bind(since)
    .fetch_one(conn)
    .await
    .context("count_recent_fails failed")?;
    Ok(n)
}

/// Reviews of one commission, newest first.
pub async fn list_for_commission(conn: &mut PgConnection, commission_id: i64) -> Result<Vec<ReviewRecord>> {
    let rows = sqlx::query(
        r#"
        select review_id, target_type, target_id, reviewer_id, result, reason, created_at
        from reviews
        where target_type = 'commission' and target_id = $1
        order by created_at desc, review_id desc
        "#,
    )
    .bind(commission_id)
    .fetch_all(conn)
    .await
    .context("list_reviews_for_commission failed")?;
    rows.iter().map(review_from_row).collect()
}
