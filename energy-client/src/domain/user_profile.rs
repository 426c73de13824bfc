/// Per-user billing settings consulted by the savings analytics.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserProfile {
    pub user_id: String,
    /// Electricity tariff in currency units per kWh. Unset until the user
    /// configures it; the monetary analytics refuse to compute without it.
    pub rate_per_kwh: Option<f64>,
    pub currency: Option<String>,
}
