//! Weather lookup by place name.
//!
//! [`WeatherApiProvider`] talks to WeatherAPI.com's `current.json` endpoint.
//! Anything implementing [`WeatherSource`] can stand in for it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use weatherly_core::ProviderConfig;

use crate::types::{CurrentConditions, Place, ProviderError, WeatherReport};

const CURRENT_PATH: &str = "/v1/current.json";
const USER_AGENT: &str = concat!("weatherly/", env!("CARGO_PKG_VERSION"));

/// WeatherAPI.com error code for "No matching location found."
const NO_MATCHING_LOCATION: i32 = 1006;

/// Something that can resolve a place name to current conditions.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self, place: &str) -> Result<WeatherReport, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    location: ApiLocation,
    current: ApiCurrent,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    temp_c: f64,
    temp_f: f64,
    condition: ApiCondition,
    humidity: u8,
    pressure_mb: f64,
    vis_km: f64,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    text: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i32,
    message: String,
}

impl From<CurrentResponse> for WeatherReport {
    fn from(body: CurrentResponse) -> Self {
        Self {
            place: Place {
                name: body.location.name,
                region: body.location.region,
                country: body.location.country,
            },
            current: CurrentConditions {
                temperature_c: body.current.temp_c,
                temperature_f: body.current.temp_f,
                condition: body.current.condition.text,
                icon_url: normalize_icon_url(&body.current.condition.icon),
                humidity: body.current.humidity,
                pressure_mb: body.current.pressure_mb,
                visibility_km: body.current.vis_km,
            },
            fetched_at: Utc::now(),
        }
    }
}

/// The API hands out protocol-relative icon URLs ("//cdn.weatherapi.com/...").
fn normalize_icon_url(icon: &str) -> String {
    if icon.starts_with("//") {
        format!("https:{}", icon)
    } else {
        icon.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    client: Arc<Client>,
    base_url: String,
    api_key: String,
}

impl WeatherApiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn classify_failure(place: &str, status: StatusCode, body: &str) -> ProviderError {
        let api_error = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);

        match (status, api_error) {
            (_, Some(err)) if err.code == NO_MATCHING_LOCATION => {
                ProviderError::NotFound(place.to_string())
            }
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
                ProviderError::Unauthorized(status.as_u16())
            }
            (_, Some(err)) => ProviderError::Status {
                status: status.as_u16(),
                message: err.message,
            },
            (_, None) => ProviderError::Status {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            },
        }
    }
}

#[async_trait]
impl WeatherSource for WeatherApiProvider {
    async fn fetch(&self, place: &str) -> Result<WeatherReport, ProviderError> {
        let url = format!("{}{}", self.base_url, CURRENT_PATH);

        tracing::info!("Fetching current weather for {:?}", place);

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", place)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = Self::classify_failure(place, status, &body);
            tracing::debug!("Weather lookup for {:?} failed: {}", place, err);
            return Err(err);
        }

        let parsed: CurrentResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parsed.into())
    }
}
