//! Geolocation records shared between commissions by external identifier.

use anyhow::{Context, Result};
use esc_schemas::PlaceRecord;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

#[derive(Debug, Clone, PartialEq)]
pub struct NewPlace {
    pub external_place_id: String,
    pub name: Option<String>,
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub map_url: Option<String>,
}

fn place_from_row(row: &PgRow) -> Result<PlaceRecord> {
    Ok(PlaceRecord {
        place_id: row.try_get("place_id")?,
        external_place_id: row.try_get("external_place_id")?,
        name: row.try_get("name")?,
        formatted_address: row.try_get("formatted_address")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        map_url: row.try_get("map_url")?,
    })
}

/// Insert or refresh the row for `external_place_id`; returns it either way.
pub async fn upsert_place(conn: &mut PgConnection, p: &NewPlace) -> Result<PlaceRecord> {
    let row = sqlx::query(
        r#"
        insert into commission_places (
          external_place_id, name, formatted_address, latitude, longitude, map_url
        ) values (
          $1, $2, $3, $4, $5, $6
        )
        on conflict (external_place_id) do update
          set name = excluded.name,
              formatted_address = excluded.formatted_address,
              latitude = excluded.latitude,
              longitude = excluded.longitude,
              map_url = excluded.map_url
        returning place_id, external_place_id, name, formatted_address, latitude, longitude, map_url
        "#,
    )
    .bind(&p.external_place_id)
    .bind(&p.name)
    .bind(&p.formatted_address)
    .bind(p.latitude)
    .bind(p.longitude)
    .bind(&p.map_url)
    .fetch_one(conn)
    .await
    .context("upsert_place failed")?;
    place_from_row(&row)
}

pub async fn fetch_place(conn: &mut PgConnection, place_id: i64) -> Result<Option<PlaceRecord>> {
    let row = sqlx::query(
        r#"
        select place_id, external_place_id, name, formatted_address, latitude, longitude, map_url
        from commission_places
        where place_id = $1
        "#,
    )
    .bind(place_id)
    .fetch_optional(conn)
    .await
    .context("fetch_place failed")?;
    row.as_ref().map(place_from_row).transpose()
}

/// Delete the place if no commission references it. Returns whether a row was
/// removed.
pub async fn delete_place_if_orphaned(conn: &mut PgConnection, place_id: i64) -> Result<bool> {
    let res = sqlx::query(
        r#"
        delete from commission_places p
        where p.place_id = $1
          and not exists (select 1 from commissions c where c.place_id = p.place_id)
        "#,
    )
    .bind(place_id)
    .execute(conn)
    .await
    .context("delete_place_if_orphaned failed")?;
    Ok(res.rows_affected() == 1)
}
