use crate::pipeline::{Envelope, PipelineError, Transform};
use energy_client::domain::MeterReading;
use time::macros::date;

/// Pure validation of a submitted `MeterReading`.
///
/// Rules:
/// - kWh must be non-negative.
/// - CO2, when recorded, must be non-negative.
/// - The reading month must be within a broad sanity window
///   [2000-01-01, 2100-01-01].
pub fn validate_reading(env: Envelope<MeterReading>) -> Result<Envelope<MeterReading>, PipelineError> {
    let r = &env.payload;

    if r.kwh < 0.0 {
        return Err(PipelineError::Transform("kwh must be non-negative".to_string()));
    }

    if let Some(co2) = r.co2_kg {
        if co2 < 0.0 {
            return Err(PipelineError::Transform("co2_kg must be non-negative".to_string()));
        }
    }

    let min_month = date!(2000-01-01);
    let max_month = date!(2100-01-01);

    if r.month < min_month || r.month > max_month {
        return Err(PipelineError::Transform("reading month out of allowed range".to_string()));
    }

    Ok(env)
}

/// Truncate the reading date to the first of its month, the canonical form
/// of the per-user dedup key.
pub fn normalize_reading_month(mut env: Envelope<MeterReading>) -> Envelope<MeterReading> {
    let month = env.payload.month;
    // Day 1 exists in every month, so replace_day cannot fail here.
    env.payload.month = month.replace_day(1).unwrap_or(month);
    env
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform<MeterReading> for ReadingValidation {
    async fn apply(
        &self,
        input: Envelope<MeterReading>,
    ) -> Result<Envelope<MeterReading>, PipelineError> {
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_meter_reading_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct MonthNormalization;

#[async_trait::async_trait]
impl Transform<MeterReading> for MonthNormalization {
    async fn apply(
        &self,
        input: Envelope<MeterReading>,
    ) -> Result<Envelope<MeterReading>, PipelineError> {
        Ok(normalize_reading_month(input))
    }
}
