use std::str::FromStr;

use time::Date;

/// How a reading entered the system. Maps to the Postgres enum
/// `reading_source` (see `sql/schema`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "reading_source", rename_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Provenance {
    /// Entered by hand through the readings endpoint.
    Manual,
    /// Loaded from a bulk CSV import.
    Imported,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown reading source '{0}'")]
pub struct UnknownProvenance(String);

impl FromStr for Provenance {
    type Err = UnknownProvenance;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Provenance::Manual),
            "imported" => Ok(Provenance::Imported),
            other => Err(UnknownProvenance(other.to_string())),
        }
    }
}

/// One electricity meter reading for one user and one calendar month.
///
/// `month` is stored as the first day of the month and doubles as the
/// per-user dedup key: at most one row exists per (user, month), and the
/// key is immutable once created.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MeterReading {
    pub user_id: String,
    pub month: Date,
    pub kwh: f64,
    /// Absent when the user recorded no emission figure; distinct from an
    /// explicit 0.
    pub co2_kg: Option<f64>,
    pub source: Provenance,
}
