use std::time::Duration;

use energy_client::domain::MeterReading;
use futures::StreamExt;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Batched writer for `meter_reading` rows.
///
/// Upserts on the (user_id, month) key: a resubmitted month overwrites the
/// quantities but can never move the month itself, which keeps the
/// one-reading-per-month invariant intact across manual edits and repeated
/// imports.
pub struct PostgresReadingSink {
    pool: PgPool,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PostgresReadingSink {
    pub fn new(pool: PgPool, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            batch_size,
            max_retries,
            retry_backoff,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope<MeterReading>]) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            let res = self.upsert_batch(batch).await;
            match res {
                Ok(()) => {
                    // Successful write: record metrics.
                    let counter = metrics::counter!("readings_written_total");
                    counter.increment(batch.len() as u64);

                    // Approximate end-to-end latency from earliest received_at to now.
                    if let Some(min_received) = batch.iter().map(|e| e.received_at).min() {
                        if let Ok(dur) = std::time::SystemTime::now().duration_since(min_received) {
                            let hist = metrics::histogram!("readings_end_to_end_latency_seconds");
                            hist.record(dur.as_secs_f64());
                        }
                    }

                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "reading sink flush failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "reading sink flush failed, giving up");
                    metrics::counter!("reading_sink_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }

    async fn upsert_batch(&self, batch: &[Envelope<MeterReading>]) -> Result<(), sqlx::Error> {
        // Postgres rejects an ON CONFLICT update that touches the same key
        // twice in one statement, so keep only the last occurrence per
        // (user, month) within the batch.
        let mut latest: std::collections::BTreeMap<(&str, time::Date), &Envelope<MeterReading>> =
            std::collections::BTreeMap::new();
        for env in batch {
            latest.insert((env.payload.user_id.as_str(), env.payload.month), env);
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO meter_reading (user_id, month, kwh, co2_kg, source) ",
        );

        builder.push("VALUES ");
        builder.push_values(latest.values(), |mut b, env| {
            let r = &env.payload;
            b.push_bind(&r.user_id)
                .push_bind(r.month)
                .push_bind(r.kwh)
                .push_bind(r.co2_kg)
                .push_bind(r.source);
        });
        builder.push(
            " ON CONFLICT (user_id, month) DO UPDATE SET \
             kwh = EXCLUDED.kwh, co2_kg = EXCLUDED.co2_kg, source = EXCLUDED.source",
        );

        let query = builder.build();
        query.execute(&self.pool).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl Sink<MeterReading> for PostgresReadingSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<MeterReading>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        let mut buffer: Vec<Envelope<MeterReading>> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                // Validation rejects are per-record; they are already
                // counted by the transform, so skip and keep draining.
                Err(e @ PipelineError::Transform(_)) => {
                    tracing::warn!(error = %e, "reading rejected upstream, skipping");
                    continue;
                }
                // A source error truncates the stream: stopping here makes
                // an interrupted import fail loudly instead of reporting a
                // partial load as success. Reruns are safe, writes upsert.
                Err(e) => {
                    tracing::error!(error = %e, "upstream pipeline failed, aborting sink");
                    return Err(e);
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer).await?;
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            self.flush_batch(&buffer).await?;
        }

        Ok(())
    }
}
