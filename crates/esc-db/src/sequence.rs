//! Per-month service code allocator.
//!
//! Codes look like `C-202610-000042`. The serial resets to 1 for each new
//! month key and is issued by a single upsert statement: the first allocation
//! of a month inserts the row, every later one increments it. Either way the
//! row stays locked until the caller's transaction ends, so concurrent
//! allocators serialize on it and a rolled-back creation returns its number.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgConnection;

/// `YYYYMM` of `now` shifted by `utc_offset_minutes`.
pub fn month_key(now: DateTime<Utc>, utc_offset_minutes: i32) -> String {
    (now + Duration::minutes(i64::from(utc_offset_minutes)))
        .format("%Y%m")
        .to_string()
}

pub fn format_code(ym: &str, seq: i64) -> String {
    format!("C-{}-{:06}", ym, seq)
}

/// Increment (or create at 1) the counter for `ym` and return the new value.
pub async fn next_seq(conn: &mut PgConnection, ym: &str, now: DateTime<Utc>) -> Result<i64> {
    let (seq,): (i64,) = sqlx::query_as(
        r#"
        insert into commission_sequence (ym, seq, updated_at)
        values ($1, 1, $2)
        on conflict (ym) do update
          set seq = commission_sequence.seq + 1,
              updated_at = excluded.updated_at
        returning seq
        "#,
    )
    .bind(ym)
    .bind(now)
    .fetch_one(conn)
    .await
    .context("commission_sequence upsert failed")?;
    Ok(seq)
}

pub async fn allocate_code(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
    utc_offset_minutes: i32,
) -> Result<String> {
    let ym = month_key(now, utc_offset_minutes);
    let seq = next_seq(conn, &ym, now).await?;
    Ok(format_code(&ym, seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn code_is_zero_padded_to_six_digits() {
        assert_eq!(format_code("202610", 1), "C-202610-000001");
        assert_eq!(format_code("202610", 123_456), "C-202610-123456");
    }

    #[test]
    fn month_key_follows_the_configured_offset() {
        // 2026-10-31 17:30 UTC is already November in UTC+8.
        let t = Utc.with_ymd_and_hms(2026, 10, 31, 17, 30, 0).unwrap();
        assert_eq!(month_key(t, 0), "202610");
        assert_eq!(month_key(t, 480), "202611");

        let new_year = Utc.with_ymd_and_hms(2026, 12, 31, 16, 0, 0).unwrap();
        assert_eq!(month_key(new_year, 480), "202701");
        assert_eq!(month_key(new_year, -60), "202612");
    }
}
