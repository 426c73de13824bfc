//! Baseline-relative consumption and emission analytics.
//!
//! Monthly summaries are derived fresh from a user's readings on every
//! request; savings and CO2 reduction are measured against the average of
//! the first [`BASELINE_MONTHS`] months of history. Everything in this
//! module is a pure function over already-fetched data: callers do the I/O
//! (see `energy_client::db`) and map [`DeviationReport`] to a response body.

use std::collections::BTreeMap;

use energy_client::domain::MeterReading;
use time::Date;

/// Number of leading months that form the baseline period. Shared by the
/// savings and CO2 calculations so the two cannot drift apart.
pub const BASELINE_MONTHS: usize = 3;

/// Per-calendar-month aggregate of one user's readings. Derived, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummary {
    /// First day of the month; the chronological sort key.
    pub month: Date,
    pub total_kwh: f64,
    pub total_co2_kg: f64,
}

/// Which underlying quantity a deviation computation operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviationMetric {
    Consumption,
    Emission,
}

/// Outcome of a deviation computation.
///
/// "No data" and "rate missing" are ordinary states, not errors: a new
/// user's first weeks land here routinely, and returning zero with an
/// explanation beats returning a misleading number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    NoData,
    InsufficientBaseline { months_needed: usize },
    RateMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DeviationReport {
    pub value: f64,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl DeviationReport {
    fn ok(value: f64) -> Self {
        Self {
            value,
            status: OutcomeStatus::Ok,
        }
    }

    fn zero(status: OutcomeStatus) -> Self {
        Self { value: 0.0, status }
    }
}

/// Group readings into per-month totals, sorted chronologically ascending.
///
/// The grouping key is the calendar year and month of the reading date;
/// day-of-month is ignored. An absent emission contributes 0 to the monthly
/// total. Pure: any permutation of the same input yields the same output,
/// and empty input yields empty output.
pub fn monthly_summaries(readings: &[MeterReading]) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<Date, (f64, f64)> = BTreeMap::new();

    for reading in readings {
        let key = first_of_month(reading.month);
        let totals = months.entry(key).or_insert((0.0, 0.0));
        totals.0 += reading.kwh;
        totals.1 += reading.co2_kg.unwrap_or(0.0);
    }

    months
        .into_iter()
        .map(|(month, (total_kwh, total_co2_kg))| MonthlySummary {
            month,
            total_kwh,
            total_co2_kg,
        })
        .collect()
}

fn first_of_month(date: Date) -> Date {
    // Day 1 exists in every month, so replace_day cannot fail here.
    date.replace_day(1).unwrap_or(date)
}

/// Cumulative deviation from the baseline average for the chosen metric.
///
/// The baseline is the arithmetic mean of the target quantity over the
/// first [`BASELINE_MONTHS`] chronological months. Each later month
/// contributes `baseline - actual`: positive means usage below baseline (a
/// saving), negative means a regression. The cumulative sum of those
/// per-month deviations is the result.
///
/// For [`DeviationMetric::Consumption`] the cumulative kWh figure is
/// converted to money with `rate_per_kwh`; a missing or non-positive rate
/// reports [`OutcomeStatus::RateMissing`] before the baseline sufficiency
/// check. Fewer than [`BASELINE_MONTHS`] months of history blocks the
/// computation entirely rather than estimating from a partial baseline.
///
/// Final values are rounded to 2 decimal places, half away from zero.
pub fn baseline_deviation(
    summaries: &[MonthlySummary],
    metric: DeviationMetric,
    rate_per_kwh: Option<f64>,
) -> DeviationReport {
    if summaries.is_empty() {
        return DeviationReport::zero(OutcomeStatus::NoData);
    }

    let rate = match metric {
        DeviationMetric::Consumption => match rate_per_kwh {
            Some(r) if r > 0.0 => Some(r),
            _ => return DeviationReport::zero(OutcomeStatus::RateMissing),
        },
        DeviationMetric::Emission => None,
    };

    if summaries.len() < BASELINE_MONTHS {
        return DeviationReport::zero(OutcomeStatus::InsufficientBaseline {
            months_needed: BASELINE_MONTHS,
        });
    }

    let quantity = |summary: &MonthlySummary| match metric {
        DeviationMetric::Consumption => summary.total_kwh,
        DeviationMetric::Emission => summary.total_co2_kg,
    };

    let baseline = summaries[..BASELINE_MONTHS]
        .iter()
        .map(quantity)
        .sum::<f64>()
        / BASELINE_MONTHS as f64;

    let cumulative: f64 = summaries[BASELINE_MONTHS..]
        .iter()
        .map(|summary| baseline - quantity(summary))
        .sum();

    let value = match rate {
        Some(r) => cumulative * r,
        None => cumulative,
    };

    DeviationReport::ok(round2(value))
}

/// Monetary savings relative to baseline, in the user's currency.
pub fn baseline_savings(
    summaries: &[MonthlySummary],
    rate_per_kwh: Option<f64>,
) -> DeviationReport {
    baseline_deviation(summaries, DeviationMetric::Consumption, rate_per_kwh)
}

/// CO2 reduction relative to baseline, in kilograms.
pub fn baseline_co2_reduction(summaries: &[MonthlySummary]) -> DeviationReport {
    baseline_deviation(summaries, DeviationMetric::Emission, None)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::domain::Provenance;
    use time::macros::date;

    fn reading(month: Date, kwh: f64, co2_kg: Option<f64>) -> MeterReading {
        MeterReading {
            user_id: "u-1".to_string(),
            month,
            kwh,
            co2_kg,
            source: Provenance::Manual,
        }
    }

    fn summaries_from_kwh(kwh: &[f64]) -> Vec<MonthlySummary> {
        kwh.iter()
            .enumerate()
            .map(|(i, &total_kwh)| MonthlySummary {
                month: date!(2024-01-01)
                    .replace_month(time::Month::try_from(i as u8 + 1).unwrap())
                    .unwrap(),
                total_kwh,
                total_co2_kg: 0.0,
            })
            .collect()
    }

    fn summaries_from_co2(co2: &[f64]) -> Vec<MonthlySummary> {
        let mut out = summaries_from_kwh(&vec![0.0; co2.len()]);
        for (summary, &total_co2_kg) in out.iter_mut().zip(co2) {
            summary.total_co2_kg = total_co2_kg;
        }
        out
    }

    #[test]
    fn grouping_is_order_independent() {
        let a = reading(date!(2024-01-01), 120.0, Some(60.0));
        let b = reading(date!(2024-02-01), 110.0, None);
        let c = reading(date!(2024-03-01), 130.0, Some(65.0));

        let forward = monthly_summaries(&[a.clone(), b.clone(), c.clone()]);
        let reversed = monthly_summaries(&[c.clone(), b.clone(), a.clone()]);
        let shuffled = monthly_summaries(&[b, c, a]);

        assert_eq!(forward, reversed);
        assert_eq!(forward, shuffled);
        assert_eq!(forward.len(), 3);
        assert_eq!(forward[0].month, date!(2024-01-01));
        assert_eq!(forward[2].month, date!(2024-03-01));
    }

    #[test]
    fn grouping_ignores_day_of_month() {
        let summaries = monthly_summaries(&[
            reading(date!(2024-01-05), 40.0, Some(10.0)),
            reading(date!(2024-01-17), 60.0, None),
        ]);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].month, date!(2024-01-01));
        assert_eq!(summaries[0].total_kwh, 100.0);
        assert_eq!(summaries[0].total_co2_kg, 10.0);
    }

    #[test]
    fn grouping_of_empty_input_is_empty() {
        assert!(monthly_summaries(&[]).is_empty());
    }

    #[test]
    fn no_data_outcome_on_empty_summaries() {
        let savings = baseline_savings(&[], Some(5.0));
        assert_eq!(savings.value, 0.0);
        assert_eq!(savings.status, OutcomeStatus::NoData);

        let co2 = baseline_co2_reduction(&[]);
        assert_eq!(co2.status, OutcomeStatus::NoData);
    }

    #[test]
    fn insufficient_baseline_below_three_months() {
        let summaries = summaries_from_kwh(&[100.0, 200.0]);
        let report = baseline_savings(&summaries, Some(5.0));

        assert_eq!(report.value, 0.0);
        assert_eq!(
            report.status,
            OutcomeStatus::InsufficientBaseline { months_needed: 3 }
        );
    }

    #[test]
    fn exactly_three_months_is_ok_with_zero_value() {
        let summaries = summaries_from_kwh(&[100.0, 110.0, 90.0]);

        let savings = baseline_savings(&summaries, Some(5.0));
        assert_eq!(savings.status, OutcomeStatus::Ok);
        assert_eq!(savings.value, 0.0);

        let co2 = baseline_co2_reduction(&summaries);
        assert_eq!(co2.status, OutcomeStatus::Ok);
        assert_eq!(co2.value, 0.0);
    }

    #[test]
    fn deviation_sign_convention() {
        // Baseline average is 100; consuming less than baseline is a saving.
        let below = baseline_savings(&summaries_from_kwh(&[100.0, 100.0, 100.0, 80.0]), Some(1.0));
        assert_eq!(below.value, 20.0);

        let above = baseline_savings(&summaries_from_kwh(&[100.0, 100.0, 100.0, 120.0]), Some(1.0));
        assert_eq!(above.value, -20.0);

        let mixed = baseline_savings(
            &summaries_from_kwh(&[100.0, 100.0, 100.0, 80.0, 90.0]),
            Some(1.0),
        );
        assert_eq!(mixed.value, 30.0);
    }

    #[test]
    fn monetary_conversion_applies_rate() {
        // Cumulative kWh deviation of 30 at 5 currency units per kWh.
        let summaries = summaries_from_kwh(&[100.0, 100.0, 100.0, 80.0, 90.0]);
        let report = baseline_savings(&summaries, Some(5.0));

        assert_eq!(report.status, OutcomeStatus::Ok);
        assert_eq!(report.value, 150.0);
    }

    #[test]
    fn rate_missing_takes_precedence_over_insufficient_baseline() {
        let four_months = summaries_from_kwh(&[100.0, 100.0, 100.0, 80.0]);

        let zero_rate = baseline_savings(&four_months, Some(0.0));
        assert_eq!(zero_rate.status, OutcomeStatus::RateMissing);
        assert_eq!(zero_rate.value, 0.0);

        let unset_rate = baseline_savings(&four_months, None);
        assert_eq!(unset_rate.status, OutcomeStatus::RateMissing);

        // Even with too little history the missing rate is reported first.
        let two_months = summaries_from_kwh(&[100.0, 100.0]);
        let report = baseline_savings(&two_months, None);
        assert_eq!(report.status, OutcomeStatus::RateMissing);
    }

    #[test]
    fn emission_path_ignores_rate() {
        let summaries = summaries_from_co2(&[50.0, 50.0, 50.0, 40.0]);
        let report = baseline_co2_reduction(&summaries);

        assert_eq!(report.status, OutcomeStatus::Ok);
        assert_eq!(report.value, 10.0);
    }

    #[test]
    fn rounds_half_away_from_zero_at_two_decimals() {
        // Deviation of 33.33333 kWh at rate 3 is 99.99999, which rounds up.
        let summaries = summaries_from_kwh(&[100.0, 100.0, 100.0, 100.0 - 33.33333]);
        let monetary = baseline_savings(&summaries, Some(3.0));
        assert_eq!(monetary.value, 100.0);

        // 16.666 kg rounds to 16.67.
        let co2 = baseline_co2_reduction(&summaries_from_co2(&[20.0, 20.0, 20.0, 3.334]));
        assert_eq!(co2.value, 16.67);
    }

    #[test]
    fn january_to_june_scenario() {
        let months = [
            (date!(2024-01-15), 120.0),
            (date!(2024-02-15), 110.0),
            (date!(2024-03-15), 130.0),
            (date!(2024-04-15), 100.0),
            (date!(2024-05-15), 90.0),
            (date!(2024-06-15), 95.0),
        ];
        let readings: Vec<MeterReading> = months
            .iter()
            .map(|&(month, kwh)| reading(month, kwh, None))
            .collect();

        let summaries = monthly_summaries(&readings);
        assert_eq!(summaries.len(), 6);

        // Baseline avg(120, 110, 130) = 120; deviations 20 + 30 + 25 = 75 kWh.
        let report = baseline_savings(&summaries, Some(6.5));
        assert_eq!(report.status, OutcomeStatus::Ok);
        assert_eq!(report.value, 487.50);
    }

    #[test]
    fn reports_serialize_with_flat_status() {
        let ok = serde_json::to_value(DeviationReport::ok(487.5)).unwrap();
        assert_eq!(ok["value"], 487.5);
        assert_eq!(ok["status"], "ok");

        let insufficient = serde_json::to_value(DeviationReport::zero(
            OutcomeStatus::InsufficientBaseline { months_needed: 3 },
        ))
        .unwrap();
        assert_eq!(insufficient["status"], "insufficient_baseline");
        assert_eq!(insufficient["months_needed"], 3);

        let missing = serde_json::to_value(DeviationReport::zero(OutcomeStatus::RateMissing)).unwrap();
        assert_eq!(missing["status"], "rate_missing");

        let empty = serde_json::to_value(DeviationReport::zero(OutcomeStatus::NoData)).unwrap();
        assert_eq!(empty["status"], "no_data");
        assert_eq!(empty["value"], 0.0);
    }
}
