use anyhow::Result;
use sqlx::PgPool;
use time::Date;

use crate::domain::MeterReading;

/// Fetch a user's readings within [start, end), ordered by month ascending.
pub async fn readings_for_user(
    pool: &PgPool,
    user_id: &str,
    start: Date,
    end: Date,
) -> Result<Vec<MeterReading>> {
    let rows = sqlx::query_as::<_, MeterReading>(
        r#"
        SELECT
            user_id,
            month,
            kwh,
            co2_kg,
            source
        FROM meter_reading
        WHERE user_id = $1
          AND month >= $2
          AND month <  $3
        ORDER BY month
        "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetch a user's entire reading history. Row order is unspecified; the
/// analytics grouping step sorts by month itself.
pub async fn all_readings_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<MeterReading>> {
    let rows = sqlx::query_as::<_, MeterReading>(
        r#"
        SELECT
            user_id,
            month,
            kwh,
            co2_kg,
            source
        FROM meter_reading
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
