use std::{fs::File, path::PathBuf, time::SystemTime};

use csv::StringRecord;
use energy_client::domain::{MeterReading, Provenance};
use futures::Stream;
use time::{macros::format_description, Date};

use crate::pipeline::{Envelope, PipelineError, Source};

/// CSV bulk-import source for `MeterReading`.
///
/// Expected header columns (by name):
/// - user_id
/// - month (YYYY-MM-DD; day-of-month is normalized away downstream)
/// - kwh
/// - co2_kg (optional; an empty cell means "no emission recorded")
/// - source (optional; "manual" or "imported", defaults to imported)
///
/// A present but unparseable cell is a hard error: silently importing it as
/// absent would corrupt the recorded-vs-absent emission distinction.
pub struct ReadingsCsvFileSource {
    path: PathBuf,
}

impl ReadingsCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn record_to_reading(
    record: &StringRecord,
    headers: &csv::StringRecord,
) -> Result<MeterReading, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV record")))
    };

    let user_id = get("user_id")?.trim().to_string();
    if user_id.is_empty() {
        return Err(PipelineError::Source("empty user_id in CSV record".to_string()));
    }

    let month_str = get("month")?;
    let month = Date::parse(month_str.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|e| PipelineError::Source(format!("invalid month '{month_str}': {e}")))?;

    let kwh_str = get("kwh")?;
    let kwh: f64 = kwh_str
        .trim()
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid kwh '{kwh_str}': {e}")))?;

    // Absent column and empty cell both mean "no emission recorded"; a
    // non-empty cell must parse.
    let co2_kg = match get("co2_kg").ok().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(s.parse().map_err(|e| {
            PipelineError::Source(format!("invalid co2_kg '{s}': {e}"))
        })?),
    };

    let source = match get("source").ok().map(str::trim) {
        None | Some("") => Provenance::Imported,
        Some(s) => s
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid source: {e}")))?,
    };

    Ok(MeterReading {
        user_id,
        month,
        kwh,
        co2_kg,
        source,
    })
}

#[async_trait::async_trait]
impl Source<MeterReading> for ReadingsCsvFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<MeterReading>, PipelineError>> + Send>>
    {
        // This source uses a blocking CSV reader but is wrapped in a single async task.
        // For large files, you might want to move this onto a dedicated thread pool.
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open CSV file: {e}")))?;
            let mut rdr = csv::Reader::from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
                .clone();

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read CSV record: {e}"
                )))?;

                let reading = match record_to_reading(&record, &headers) {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("readings_csv_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };

                yield Envelope {
                    payload: reading,
                    received_at: SystemTime::now(),
                };
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn headers() -> StringRecord {
        StringRecord::from(vec!["user_id", "month", "kwh", "co2_kg"])
    }

    #[test]
    fn parses_full_record() {
        let record = StringRecord::from(vec!["u-1", "2024-01-15", "120.5", "55.2"]);
        let reading = record_to_reading(&record, &headers()).unwrap();

        assert_eq!(reading.user_id, "u-1");
        assert_eq!(reading.month, date!(2024-01-15));
        assert_eq!(reading.kwh, 120.5);
        assert_eq!(reading.co2_kg, Some(55.2));
        assert_eq!(reading.source, Provenance::Imported);
    }

    #[test]
    fn missing_co2_stays_absent() {
        let record = StringRecord::from(vec!["u-1", "2024-01-01", "120.5", ""]);
        let reading = record_to_reading(&record, &headers()).unwrap();
        assert_eq!(reading.co2_kg, None);
    }

    #[test]
    fn whitespace_padded_co2_parses() {
        let record = StringRecord::from(vec!["u-1", "2024-01-01", "120.5", " 55.2"]);
        let reading = record_to_reading(&record, &headers()).unwrap();
        assert_eq!(reading.co2_kg, Some(55.2));
    }

    #[test]
    fn rejects_malformed_co2() {
        let record = StringRecord::from(vec!["u-1", "2024-01-01", "120.5", "abc"]);
        let res = record_to_reading(&record, &headers());
        assert!(matches!(res, Err(PipelineError::Source(_))));
    }

    #[test]
    fn explicit_source_column_overrides_default() {
        let headers = StringRecord::from(vec!["user_id", "month", "kwh", "co2_kg", "source"]);
        let record = StringRecord::from(vec!["u-1", "2024-01-01", "120.5", "", "manual"]);
        let reading = record_to_reading(&record, &headers).unwrap();
        assert_eq!(reading.source, Provenance::Manual);
    }

    #[test]
    fn rejects_unknown_source_tag() {
        let headers = StringRecord::from(vec!["user_id", "month", "kwh", "co2_kg", "source"]);
        let record = StringRecord::from(vec!["u-1", "2024-01-01", "120.5", "", "bulk"]);
        let res = record_to_reading(&record, &headers);
        assert!(matches!(res, Err(PipelineError::Source(_))));
    }

    #[test]
    fn rejects_malformed_month() {
        let record = StringRecord::from(vec!["u-1", "January 2024", "120.5", ""]);
        let res = record_to_reading(&record, &headers());
        assert!(matches!(res, Err(PipelineError::Source(_))));
    }

    #[test]
    fn rejects_missing_column() {
        let headers = StringRecord::from(vec!["user_id", "month"]);
        let record = StringRecord::from(vec!["u-1", "2024-01-01"]);
        let res = record_to_reading(&record, &headers);
        assert!(matches!(res, Err(PipelineError::Source(_))));
    }
}
