//! Receipt and shipping rows, one of each per commission.

use anyhow::{Context, Result};
use esc_schemas::{ReceiptRecord, ShippingRecord};
use sqlx::{PgConnection, Row};

pub async fn fetch_receipt(conn: &mut PgConnection, commission_id: i64) -> Result<Option<ReceiptRecord>> {
    let row = sqlx::query(
        r#"
        select commission_id, uploaded_by, receipt_ref, receipt_amount, receipt_date,
               remark, uploaded_at
        from commission_receipts
        where commission_id = $1
        "#,
    )
    .bind(commission_id)
    .fetch_optional(conn)
    .await
    .context("fetch_receipt failed")?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(ReceiptRecord {
        commission_id: row.try_get("commission_id")?,
        uploaded_by: row.try_get("uploaded_by")?,
        receipt_ref: row.try_get("receipt_ref")?,
        receipt_amount: row.try_get("receipt_amount")?,
        receipt_date: row.try_get("receipt_date")?,
        remark: row.try_get("remark")?,
        uploaded_at: row.try_get("uploaded_at")?,
    }))
}

pub async fn upsert_receipt(conn: &mut PgConnection, r: &ReceiptRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into commission_receipts (
          commission_id, uploaded_by, receipt_ref, receipt_amount, receipt_date, remark, uploaded_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7
        )
        on conflict (commission_id) do update
          set uploaded_by = excluded.uploaded_by,
              receipt_ref = excluded.receipt_ref,
              receipt_amount = excluded.receipt_amount,
              receipt_date = excluded.receipt_date,
              remark = excluded.remark,
              uploaded_at = excluded.uploaded_at
        "#,
    )
    .bind(r.commission_id)
    .bind(&r.uploaded_by)
    .bind(&r.receipt_ref)
    .bind(r.receipt_amount)
    .bind(r.receipt_date)
    .bind(&r.remark)
    .bind(r.uploaded_at)
    .execute(conn)
    .await
    .context("upsert_receipt failed")?;
    Ok(())
}

/// Undo an upload whose file never reached storage: put `previous` back, or
/// drop the row when there was none. Only applies while the row still holds
/// `expected_ref`; returns whether it did.
pub async fn restore_receipt(
    conn: &mut PgConnection,
    commission_id: i64,
    expected_ref: &str,
    previous: Option<&ReceiptRecord>,
) -> Result<bool> {
    let res = match previous {
        Some(p) => sqlx::query(
            r#"
            update commission_receipts
            set uploaded_by = $3,
                receipt_ref = $4,
                receipt_amount = $5,
                receipt_date = $6,
                remark = $7,
                uploaded_at = $8
            where commission_id = $1 and receipt_ref = $2
            "#,
        )
        .bind(commission_id)
        .bind(expected_ref)
        .bind(&p.uploaded_by)
        .bind(&p.receipt_ref)
        .bind(p.receipt_amount)
        .bind(p.receipt_date)
        .bind(&p.remark)
        .bind(p.uploaded_at)
        .execute(conn)
        .await
        .context("restore_receipt failed")?,
        None => sqlx::query(
            "delete from commission_receipts where commission_id = $1 and receipt_ref = $2",
        )
        .bind(commission_id)
        .bind(expected_ref)
        .execute(conn)
        .await
        .context("restore_receipt failed")?,
    };
    Ok(res.rows_affected() == 1)
}

pub async fn fetch_shipping(conn: &mut PgConnection, commission_id: i64) -> Result<Option<ShippingRecord>> {
    let row = sqlx::query(
        r#"
        select commission_id, shipped_by, logistics_name, tracking_number, remark, shipped_at
        from commission_shippings
        where commission_id = $1
        "#,
    )
    .bind(commission_id)
    .fetch_optional(conn)
    .await
    .context("fetch_shipping failed")?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(ShippingRecord {
        commission_id: row.try_get("commission_id")?,
        shipped_by: row.try_get("shipped_by")?,
        logistics_name: row.try_get("logistics_name")?,
        tracking_number: row.try_get("tracking_number")?,
        remark: row.try_get("remark")?,
        shipped_at: row.try_get("shipped_at")?,
    }))
}

pub async fn upsert_shipping(conn: &mut PgConnection, s: &ShippingRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into commission_shippings (
          commission_id, shipped_by, logistics_name, tracking_number, remark, shipped_at
        ) values (
          $1, $2, $3, $4, $5, $6
        )
        on conflict (commission_id) do update
          set shipped_by = excluded.shipped_by,
              logistics_name = excluded.logistics_name,
              tracking_number = excluded.tracking_number,
              remark = excluded.remark,
              shipped_at = excluded.shipped_at
        "#,
    )
    .bind(s.commission_id)
    .bind(&s.shipped_by)
    .bind(&s.logistics_name)
    .bind(&s.tracking_number)
    .bind(&s.remark)
    .bind(s.shipped_at)
    .execute(conn)
    .await
    .context("upsert_shipping failed")?;
    Ok(())
}

/// Remove receipt and shipping rows of a commission being deleted.
pub async fn delete_for_commission(conn: &mut PgConnection, commission_id: i64) -> Result<()> {
    sqlx::query("delete from commission_receipts where commission_id = $1")
        .bind(commission_id)
        .execute(&mut *conn)
        .await
        .context("delete receipts failed")?;
    sqlx::query("delete from commission_shippings where commission_id = $1")
        .bind(commission_id)
        .execute(&mut *conn)
        .await
        .context("delete shippings failed")?;
    Ok(())
}
