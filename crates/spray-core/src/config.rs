//! Plan tunables: the raw request and its normalized, immutable form.
//!
//! Every field of the request is optional. Normalization never fails: missing
//! or non-finite values take the default, out-of-range values are clamped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spatial::is_valid_coordinate;

/// Caller-supplied plan options, as received from the API or a fixture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SprayPlanRequest {
    pub species: Option<Vec<String>>,
    pub include_ai_detections: Option<bool>,
    pub include_manual_annotations: Option<bool>,
    pub include_unverified: Option<bool>,
    pub min_confidence: Option<f64>,

    pub zone_radius_m: Option<f64>,
    pub min_detections_per_zone: Option<u32>,
    pub max_zones_per_mission: Option<u32>,
    pub max_area_ha_per_mission: Option<f64>,
    pub max_tank_liters: Option<f64>,
    pub cruise_speed_mps: Option<f64>,
    pub spray_rate_ha_per_min: Option<f64>,
    pub default_dose_per_ha: Option<f64>,

    pub start_lat: Option<f64>,
    pub start_lon: Option<f64>,
    pub return_to_start: Option<bool>,
    pub compliance_enabled: Option<bool>,

    pub weather_enabled: Option<bool>,
    pub weather_lookahead_hours: Option<u32>,
    pub max_wind_mps: Option<f64>,
    pub max_gust_mps: Option<f64>,
    pub max_precipitation_probability: Option<f64>,
    pub min_temperature_c: Option<f64>,
    pub max_temperature_c: Option<f64>,
    pub turnaround_minutes: Option<f64>,
    pub preferred_launch_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartCoordinate {
    pub lat: f64,
    pub lon: f64,
}

/// Which source points feed the clusterer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionFilter {
    /// Lower-cased species names; empty means every species
    pub species: Vec<String>,
    pub include_ai_detections: bool,
    pub include_manual_annotations: bool,
    pub include_unverified: bool,
    pub min_confidence: f64,
}

impl SelectionFilter {
    pub fn allows_species(&self, species: &str) -> bool {
        if self.species.is_empty() {
            return true;
        }
        let needle = species.trim().to_lowercase();
        self.species.iter().any(|allowed| *allowed == needle)
    }
}

/// Weather thresholds and scheduling options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherThresholds {
    pub enabled: bool,
    pub lookahead_hours: u32,
    pub max_wind_mps: f64,
    pub max_gust_mps: f64,
    pub max_precipitation_probability: f64,
    pub min_temperature_c: f64,
    pub max_temperature_c: f64,
    pub turnaround_minutes: f64,
    pub preferred_launch_time: Option<DateTime<Utc>>,
}

/// Normalized plan configuration. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprayPlanConfig {
    pub selection: SelectionFilter,
    pub zone_radius_m: f64,
    pub min_detections_per_zone: u32,
    pub max_zones_per_mission: u32,
    pub max_area_ha_per_mission: f64,
    pub max_tank_liters: f64,
    pub cruise_speed_mps: f64,
    pub spray_rate_ha_per_min: f64,
    pub default_dose_per_ha: f64,
    pub start: Option<StartCoordinate>,
    pub return_to_start: bool,
    pub compliance_enabled: bool,
    pub weather: WeatherThresholds,
}

const DEFAULT_ZONE_RADIUS_M: f64 = 22.0;
const DEFAULT_MIN_CONFIDENCE: f64 = 0.35;
const DEFAULT_MIN_DETECTIONS: u32 = 2;
const DEFAULT_MAX_ZONES: u32 = 12;
const DEFAULT_MAX_AREA_HA: f64 = 8.0;
const DEFAULT_MAX_TANK_L: f64 = 30.0;
const DEFAULT_CRUISE_SPEED_MPS: f64 = 8.0;
const DEFAULT_SPRAY_RATE_HA_PER_MIN: f64 = 0.2;
const DEFAULT_DOSE_PER_HA: f64 = 2.0;
const DEFAULT_LOOKAHEAD_HOURS: u32 = 24;
const DEFAULT_MAX_WIND_MPS: f64 = 8.0;
const DEFAULT_MAX_GUST_MPS: f64 = 11.0;
const DEFAULT_MAX_PRECIP_PROB: f64 = 40.0;
const DEFAULT_MIN_TEMP_C: f64 = 5.0;
const DEFAULT_MAX_TEMP_C: f64 = 35.0;
const DEFAULT_TURNAROUND_MIN: f64 = 10.0;
const MIN_TEMPERATURE_SPREAD_C: f64 = 1.0;

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

fn clamped(value: Option<f64>, default: f64, min: f64, max: f64) -> f64 {
    finite_or(value, default).clamp(min, max)
}

impl SprayPlanConfig {
    /// Normalize a request. Clamping is silent; this never fails.
    pub fn from_request(request: &SprayPlanRequest) -> Self {
        let species: Vec<String> = request
            .species
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        let start = match (request.start_lat, request.start_lon) {
            (Some(lat), Some(lon)) if is_valid_coordinate(lat, lon) => {
                Some(StartCoordinate { lat, lon })
            }
            _ => None,
        };

        let mut min_temp = clamped(request.min_temperature_c, DEFAULT_MIN_TEMP_C, -30.0, 60.0);
        let mut max_temp = clamped(request.max_temperature_c, DEFAULT_MAX_TEMP_C, -30.0, 60.0);
        if min_temp > max_temp {
            std::mem::swap(&mut min_temp, &mut max_temp);
        }
        if max_temp - min_temp < MIN_TEMPERATURE_SPREAD_C {
            max_temp = min_temp + MIN_TEMPERATURE_SPREAD_C;
        }

        Self {
            selection: SelectionFilter {
                species,
                include_ai_detections: request.include_ai_detections.unwrap_or(true),
                include_manual_annotations: request.include_manual_annotations.unwrap_or(true),
                include_unverified: request.include_unverified.unwrap_or(false),
                min_confidence: clamped(request.min_confidence, DEFAULT_MIN_CONFIDENCE, 0.0, 1.0),
            },
            zone_radius_m: clamped(request.zone_radius_m, DEFAULT_ZONE_RADIUS_M, 8.0, 250.0),
            min_detections_per_zone: request
                .min_detections_per_zone
                .unwrap_or(DEFAULT_MIN_DETECTIONS)
                .max(1),
            max_zones_per_mission: request
                .max_zones_per_mission
                .unwrap_or(DEFAULT_MAX_ZONES)
                .max(1),
            max_area_ha_per_mission: clamped(
                request.max_area_ha_per_mission,
                DEFAULT_MAX_AREA_HA,
                0.2,
                100.0,
            ),
            max_tank_liters: clamped(request.max_tank_liters, DEFAULT_MAX_TANK_L, 1.0, 1000.0),
            cruise_speed_mps: clamped(request.cruise_speed_mps, DEFAULT_CRUISE_SPEED_MPS, 1.0, 35.0),
            spray_rate_ha_per_min: clamped(
                request.spray_rate_ha_per_min,
                DEFAULT_SPRAY_RATE_HA_PER_MIN,
                0.01,
                10.0,
            ),
            default_dose_per_ha: clamped(
                request.default_dose_per_ha,
                DEFAULT_DOSE_PER_HA,
                0.01,
                50.0,
            ),
            start,
            return_to_start: request.return_to_start.unwrap_or(true),
            compliance_enabled: request.compliance_enabled.unwrap_or(true),
            weather: WeatherThresholds {
                enabled: request.weather_enabled.unwrap_or(true),
                lookahead_hours: request
                    .weather_lookahead_hours
                    .unwrap_or(DEFAULT_LOOKAHEAD_HOURS)
                    .clamp(6, 72),
                max_wind_mps: clamped(request.max_wind_mps, DEFAULT_MAX_WIND_MPS, 0.5, 40.0),
                max_gust_mps: clamped(request.max_gust_mps, DEFAULT_MAX_GUST_MPS, 0.5, 60.0),
                max_precipitation_probability: clamped(
                    request.max_precipitation_probability,
                    DEFAULT_MAX_PRECIP_PROB,
                    0.0,
                    100.0,
                ),
                min_temperature_c: min_temp,
                max_temperature_c: max_temp,
                turnaround_minutes: clamped(
                    request.turnaround_minutes,
                    DEFAULT_TURNAROUND_MIN,
                    0.0,
                    120.0,
                ),
                preferred_launch_time: request.preferred_launch_time,
            },
        }
    }
}

impl Default for SprayPlanConfig {
    fn default() -> Self {
        Self::from_request(&SprayPlanRequest::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_to_an_empty_request() {
        let config = SprayPlanConfig::default();
        assert_eq!(config.zone_radius_m, DEFAULT_ZONE_RADIUS_M);
        assert_eq!(config.min_detections_per_zone, 2);
        assert!(config.selection.include_ai_detections);
        assert!(!config.selection.include_unverified);
        assert!(config.weather.enabled);
        assert!(config.start.is_none());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let request = SprayPlanRequest {
            zone_radius_m: Some(2.0),
            max_area_ha_per_mission: Some(1_000.0),
            max_tank_liters: Some(0.0),
            cruise_speed_mps: Some(f64::NAN),
            min_confidence: Some(1.7),
            min_detections_per_zone: Some(0),
            max_zones_per_mission: Some(0),
            weather_lookahead_hours: Some(500),
            turnaround_minutes: Some(-5.0),
            ..Default::default()
        };
        let config = SprayPlanConfig::from_request(&request);
        assert_eq!(config.zone_radius_m, 8.0);
        assert_eq!(config.max_area_ha_per_mission, 100.0);
        assert_eq!(config.max_tank_liters, 1.0);
        assert_eq!(config.cruise_speed_mps, DEFAULT_CRUISE_SPEED_MPS);
        assert_eq!(config.selection.min_confidence, 1.0);
        assert_eq!(config.min_detections_per_zone, 1);
        assert_eq!(config.max_zones_per_mission, 1);
        assert_eq!(config.weather.lookahead_hours, 72);
        assert_eq!(config.weather.turnaround_minutes, 0.0);
    }

    #[test]
    fn inverted_temperature_band_is_reordered_and_widened() {
        let request = SprayPlanRequest {
            min_temperature_c: Some(30.0),
            max_temperature_c: Some(10.0),
            ..Default::default()
        };
        let config = SprayPlanConfig::from_request(&request);
        assert_eq!(config.weather.min_temperature_c, 10.0);
        assert_eq!(config.weather.max_temperature_c, 30.0);

        let request = SprayPlanRequest {
            min_temperature_c: Some(20.0),
            max_temperature_c: Some(20.2),
            ..Default::default()
        };
        let config = SprayPlanConfig::from_request(&request);
        assert!(config.weather.max_temperature_c - config.weather.min_temperature_c >= 1.0);
    }

    #[test]
    fn species_filter_is_normalized() {
        let request = SprayPlanRequest {
            species: Some(vec!["  Lantana ".into(), "".into(), "BITOU Bush".into()]),
            ..Default::default()
        };
        let config = SprayPlanConfig::from_request(&request);
        assert_eq!(config.selection.species, vec!["lantana", "bitou bush"]);
        assert!(config.selection.allows_species("LANTANA"));
        assert!(!config.selection.allows_species("parthenium"));
    }

    #[test]
    fn invalid_start_coordinate_is_ignored() {
        let request = SprayPlanRequest {
            start_lat: Some(120.0),
            start_lon: Some(153.0),
            ..Default::default()
        };
        assert!(SprayPlanConfig::from_request(&request).start.is_none());

        let request = SprayPlanRequest {
            start_lat: Some(-27.5),
            start_lon: Some(153.0),
            ..Default::default()
        };
        let start = SprayPlanConfig::from_request(&request).start.unwrap();
        assert_eq!(start.lat, -27.5);
    }
}
