use anyhow::Result;
use energy_client::domain::MeterReading;
use energy_service::{
    config::AppConfig,
    metrics_server, observability,
    pipeline::Pipeline,
    sinks::PostgresReadingSink,
    sources::HttpJsonSource,
    transform,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let sink_cfg = &cfg.readings.sink;
    let sink = PostgresReadingSink::new(
        pool,
        sink_cfg.batch_size,
        sink_cfg.max_retries,
        Duration::from_millis(sink_cfg.retry_backoff_ms),
    );

    let source_cfg = &cfg.readings.source;
    let source = HttpJsonSource::new(&source_cfg.http_bind_addr, source_cfg.channel_capacity).await?;

    let pipeline: Pipeline<_, MeterReading, _> = Pipeline {
        source,
        transforms: vec![
            Arc::new(transform::ReadingValidation::default()),
            Arc::new(transform::MonthNormalization::default()),
        ],
        sink,
    };

    pipeline.run().await?;

    Ok(())
}
