use anyhow::{bail, Result};
use energy_client::domain::MeterReading;
use energy_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::PostgresReadingSink,
    sources::ReadingsCsvFileSource,
    transform,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: import_readings <csv_file_path>");
    }
    let file_path = &args[1];

    // Load configuration (can point ENERGY_CONFIG to an import-specific file).
    let cfg = AppConfig::load()?;

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

    let source = ReadingsCsvFileSource::new(file_path);

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
