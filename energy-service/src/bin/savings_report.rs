use anyhow::{bail, Result};
use energy_client::db::{profile_queries, reading_queries};
use energy_service::{
    analytics::{self, BASELINE_MONTHS},
    config::AppConfig,
    observability,
};
use sqlx::postgres::PgPoolOptions;
use std::env;

/// One-shot baseline report for a single user: monthly summaries, monetary
/// savings, and CO2 reduction relative to the first months of history.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: savings_report <user_id>");
    }
    let user_id = &args[1];

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let readings = reading_queries::all_readings_for_user(&pool, user_id).await?;
    let rate_per_kwh = profile_queries::profile_for_user(&pool, user_id)
        .await?
        .and_then(|p| p.rate_per_kwh);

    let summaries = analytics::monthly_summaries(&readings);
    let savings = analytics::baseline_savings(&summaries, rate_per_kwh);
    let co2 = analytics::baseline_co2_reduction(&summaries);

    tracing::info!(
        user_id = %user_id,
        readings = readings.len(),
        months = summaries.len(),
        baseline_months = BASELINE_MONTHS,
        "reading history summarized"
    );
    tracing::info!(
        savings = %serde_json::to_string(&savings)?,
        co2_reduction = %serde_json::to_string(&co2)?,
        "baseline deviation report"
    );

    Ok(())
}
