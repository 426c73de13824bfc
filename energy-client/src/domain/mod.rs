pub mod meter_reading;
pub mod user_profile;

pub use meter_reading::{MeterReading, Provenance, UnknownProvenance};
pub use user_profile::UserProfile;
