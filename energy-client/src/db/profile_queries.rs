use anyhow::Result;
use sqlx::PgPool;

use crate::domain::UserProfile;

/// Fetch the billing profile for a user, if one has been created.
pub async fn profile_for_user(pool: &PgPool, user_id: &str) -> Result<Option<UserProfile>> {
    let row = sqlx::query_as::<_, UserProfile>(
        r#"
        SELECT
            user_id,
            rate_per_kwh,
            currency
        FROM user_profile
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
