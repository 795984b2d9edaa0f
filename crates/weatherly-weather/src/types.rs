use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a report applies, as named by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub region: String,
    pub country: String,
}

impl Place {
    /// "Name, Region, Country", skipping empty parts
    pub fn display_name(&self) -> String {
        [&self.name, &self.region, &self.country]
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Current conditions at a place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature_c: f64,
    pub temperature_f: f64,
    /// Provider's textual description, e.g. "Partly cloudy"
    pub condition: String,
    /// Absolute URL of the provider's condition icon
    pub icon_url: String,
    pub humidity: u8,
    pub pressure_mb: f64,
    pub visibility_km: f64,
}

/// One successful lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub place: Place,
    pub current: CurrentConditions,
    pub fetched_at: DateTime<Utc>,
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Place not found: {0}")]
    NotFound(String),
    #[error("Provider rejected the API key (status {0})")]
    Unauthorized(u16),
    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    /// The lookup task died before producing a result.
    #[error("Lookup aborted: {0}")]
    Aborted(String),
}

/// Recent-searches persistence errors
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Failed to read recent searches: {0}")]
    PersistenceRead(String),
    #[error("Failed to write recent searches: {0}")]
    PersistenceWrite(String),
}
