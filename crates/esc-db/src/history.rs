//! Append-only commission history.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use esc_audit::{HistoryDiff, HistoryEntry};
use esc_schemas::HistoryAction;
use serde_json::Value;
use sqlx::{PgConnection, Row};

pub async fn insert_history(
    conn: &mut PgConnection,
    commission_id: i64,
    action: HistoryAction,
    actor_id: &str,
    diff: &HistoryDiff,
    at: DateTime<Utc>,
) -> Result<i64> {
    let (old_data, new_data) = diff.to_snapshots()?;
    let (history_id,): (i64,) = sqlx::query_as(
        r#"
        insert into commission_history (
          commission_id, action, actor_id, old_data, new_data, created_at
        ) values (
          $1, $2, $3, $4, $5, $6
        )
        returning history_id
        "#,
    )
    .bind(commission_id)
    .bind(action.as_str())
    .bind(actor_id)
    .bind(&old_data)
    .bind(&new_data)
    .bind(at)
    .fetch_one(conn)
    .await
    .context("insert_history failed")?;
    Ok(history_id)
}

/// Oldest first.
pub async fn list_history(conn: &mut PgConnection, commission_id: i64) -> Result<Vec<HistoryEntry>> {
    let rows = sqlx::query(
        r#"
        select history_id, commission_id, action, actor_id, old_data, new_data, created_at
        from commission_history
        where commission_id = $1
        order by history_id asc
        "#,
    )
    .bind(commission_id)
    .fetch_all(conn)
    .await
    .context("list_history failed")?;

    rows.iter()
        .map(|row| -> Result<HistoryEntry> {
            let old_data: Value = row.try_get("old_data")?;
            let new_data: Value = row.try_get("new_data")?;
            Ok(HistoryEntry {
                history_id: row.try_get("history_id")?,
                commission_id: row.try_get("commission_id")?,
                action: HistoryAction::parse(&row.try_get::<String, _>("action")?)?,
                actor_id: row.try_get("actor_id")?,
                diff: HistoryDiff::from_snapshots(&old_data, &new_data)?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

/// Only used when the commission itself is deleted.
pub async fn delete_history(conn: &mut PgConnection, commission_id: i64) -> Result<u64> {
    let res = sqlx::query("delete from commission_history where commission_id = $1")
        .bind(commission_id)
        .execute(conn)
        .await
        .context("delete_history failed")?;
    Ok(res.rows_affected())
}
