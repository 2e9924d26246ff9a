//! Open-Meteo hourly forecast provider.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use spray_core::{ForecastPoint, WeatherForecastSnapshot};
use std::time::Duration;
use thiserror::Error;

use crate::collaborators::ForecastProvider;
use crate::config::Config;

const PROVIDER: &str = "open-meteo";
const HOURLY_FIELDS: &str = "wind_speed_10m,wind_gusts_10m,precipitation_probability,temperature_2m";

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("forecast request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("forecast provider HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("forecast response missing hourly data")]
    MissingHourly,
    #[error("forecast response had no usable hours")]
    Empty,
    #[error("forecast unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    timezone: Option<String>,
    hourly: Option<HourlySeries>,
}

#[derive(Debug, Deserialize)]
struct HourlySeries {
    time: Vec<String>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    wind_gusts_10m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
}

pub struct OpenMeteoProvider {
    client: Client,
    url: String,
}

impl OpenMeteoProvider {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.weather_timeout_s))
            .build()
            .context("building forecast HTTP client")?;
        Ok(Self {
            client,
            url: config.weather_url.clone(),
        })
    }
}

#[async_trait]
impl ForecastProvider for OpenMeteoProvider {
    async fn hourly_forecast(&self, lat: f64, lon: f64, hours: u32) -> Result<WeatherForecastSnapshot, ForecastError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("hourly", HOURLY_FIELDS.to_string()),
                ("windspeed_unit", "ms".to_string()),
                ("timezone", "UTC".to_string()),
                ("forecast_hours", hours.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ForecastError::Status(response.status()));
        }

        let payload: ForecastResponse = response.json().await?;
        let snapshot = snapshot_from_response(payload, Utc::now())?;
        tracing::debug!(points = snapshot.points.len(), lat, lon, "Forecast fetched");
        Ok(snapshot)
    }
}

/// Hours arrive as `YYYY-MM-DDTHH:MM` in UTC.
fn parse_hour(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc)))
}

fn snapshot_from_response(
    payload: ForecastResponse,
    fetched_at: DateTime<Utc>,
) -> Result<WeatherForecastSnapshot, ForecastError> {
    fn value(series: &[Option<f64>], idx: usize) -> Option<f64> {
        series.get(idx).copied().flatten().filter(|v| v.is_finite())
    }

    let hourly = payload.hourly.ok_or(ForecastError::MissingHourly)?;

    // Hours missing wind, gust or temperature cannot be scored; skip them
    let points: Vec<ForecastPoint> = hourly
        .time
        .iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            Some(ForecastPoint {
                timestamp: parse_hour(raw)?,
                wind_speed_mps: value(&hourly.wind_speed_10m, idx)?,
                wind_gust_mps: value(&hourly.wind_gusts_10m, idx)?,
                precipitation_probability: value(&hourly.precipitation_probability, idx)
                    .unwrap_or(0.0)
                    .clamp(0.0, 100.0),
                temperature_c: value(&hourly.temperature_2m, idx)?,
            })
        })
        .collect();

    if points.is_empty() {
        return Err(ForecastError::Empty);
    }

    Ok(WeatherForecastSnapshot {
        provider: PROVIDER.to_string(),
        fetched_at,
        latitude: payload.latitude,
        longitude: payload.longitude,
        timezone: payload.timezone.unwrap_or_else(|| "UTC".to_string()),
        points,
    })
}
