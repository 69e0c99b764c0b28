//! Orders: created at claim time, one per commission.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use esc_schemas::{FulfilmentItem, OrderRecord, OrderStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

use crate::commissions::commission_from_row;

fn order_from_row(row: &PgRow) -> Result<OrderRecord> {
    Ok(OrderRecord {
        order_id: row.try_get("order_id")?,
        commission_id: row.try_get("commission_id")?,
        fulfiller_id: row.try_get("fulfiller_id")?,
        requester_id: row.try_get("requester_id")?,
        amount: row.try_get("amount")?,
        status: OrderStatus::parse(&row.try_get::<String, _>("order_status")?)?,
        created_at: row.try_get("order_created_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

const ORDER_COLUMNS: &str = r#"
    o.order_id, o.commission_id, o.fulfiller_id, o.requester_id, o.amount,
    o.status as order_status, o.created_at as order_created_at, o.finished_at
"#;

/// Insert a PENDING order. The unique constraint on `commission_id` makes a
/// second order for the same commission fail.
pub async fn insert_order(
    conn: &mut PgConnection,
    commission_id: i64,
    fulfiller_id: &str,
    requester_id: &str,
    amount: i64,
    now: DateTime<Utc>,
) -> Result<OrderRecord> {
    let sql = format!(
        r#"
        insert into commission_orders as o (
          commission_id, fulfiller_id, requester_id, amount, status, created_at
        ) values (
          $1, $2, $3, $4, 'PENDING', $5
        )
        returning {ORDER_COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(commission_id)
        .bind(fulfiller_id)
        .bind(requester_id)
        .bind(amount)
        .bind(now)
        .fetch_one(conn)
        .await
        .context("insert_order failed")?;
    order_from_row(&row)
}

pub async fn fetch_for_commission(conn: &mut PgConnection, commission_id: i64) -> Result<Option<OrderRecord>> {
    let sql = format!("select {ORDER_COLUMNS} from commission_orders o where o.commission_id = $1");
    let row = sqlx::query(&sql)
        .bind(commission_id)
        .fetch_optional(conn)
        .await
        .context("fetch_order_for_commission failed")?;
    row.as_ref().map(order_from_row).transpose()
}

pub async fn lock_for_commission(conn: &mut PgConnection, commission_id: i64) -> Result<Option<OrderRecord>> {
    let sql = format!(
        "select {ORDER_COLUMNS} from commission_orders o where o.commission_id = $1 for update"
    );
    let row = sqlx::query(&sql)
        .bind(commission_id)
        .fetch_optional(conn)
        .await
        .context("lock_order_for_commission failed")?;
    row.as_ref().map(order_from_row).transpose()
}

/// Move a PENDING order to a terminal status. Returns false when the order
/// was not pending any more.
pub async fn finish_order(
    conn: &mut PgConnection,
    order_id: i64,
    status: OrderStatus,
    finished_at: DateTime<Utc>,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update commission_orders
        set status = $2,
            finished_at = $3
        where order_id = $1 and status = 'PENDING'
        "#,
    )
    .bind(order_id)
    .bind(status.as_str())
    .bind(finished_at)
    .execute(conn)
    .await
    .context("finish_order failed")?;
    Ok(res.rows_affected() == 1)
}

pub async fn count_for_commission(conn: &mut PgConnection, commission_id: i64) -> Result<i64> {
    let (n,): (i64,) =
        sqlx::query_as("select count(*)::bigint from commission_orders where commission_id = $1")
            .bind(commission_id)
            .fetch_one(conn)
            .await
            .context("count_orders_for_commission failed")?;
    Ok(n)
}

/// Orders a fulfiller still has pending, with their commissions, newest first.
pub async fn list_pending_for_fulfiller(
    conn: &mut PgConnection,
    fulfiller_id: &str,
) -> Result<Vec<FulfilmentItem>> {
    let sql = format!(
        r#"
        select {ORDER_COLUMNS},
          c.commission_id, c.service_code, c.requester_id, c.title, c.description,
          c.category, c.location, c.image_ref, c.price_micros, c.quantity, c.currency,
          c.fx_rate_micros, c.fee, c.escrow_amount, c.deadline, c.status, c.place_id,
          c.created_at, c.updated_at
        from commission_orders o
        join commissions c on c.commission_id = o.commission_id
        where o.fulfiller_id = $1
          and o.status = 'PENDING'
        order by o.created_at desc, o.order_id desc
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(fulfiller_id)
        .fetch_all(conn)
        .await
        .context("list_pending_for_fulfiller failed")?;

    rows.iter()
        .map(|row| -> Result<FulfilmentItem> {
            Ok(FulfilmentItem {
                commission: commission_from_row(row)?,
                order: order_from_row(row)?,
            })
        })
        .collect()
}
