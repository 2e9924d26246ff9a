//! Weather window optimization.
//!
//! Scores each forecast hour against the plan's thresholds, then picks the
//! launch time whose back-to-back mission schedule minimizes the combined
//! objective. A missing forecast degrades to an unused report; it never fails
//! a plan.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WeatherThresholds;
use crate::models::{
    ForecastPoint, MissionDraft, MissionWeatherSchedule, RiskAssessment, WeatherDecision,
    WeatherForecastSnapshot,
};

const WIND_WEIGHT: f64 = 0.35;
const GUST_WEIGHT: f64 = 0.35;
const PRECIPITATION_WEIGHT: f64 = 0.20;
const TEMPERATURE_WEIGHT: f64 = 0.10;

/// Ratios above this add nothing more to the score.
const MAX_RATIO: f64 = 2.0;
/// Degrees outside the temperature band at which the penalty saturates.
const TEMPERATURE_PENALTY_SPAN_C: f64 = 5.0;
/// Exceeding a threshold by more than this fraction forces NO_GO.
const HARD_EXCEEDANCE: f64 = 0.10;
const CAUTION_SCORE: f64 = 0.75;

const OBJECTIVE_AVG_WEIGHT: f64 = 100.0;
const OBJECTIVE_MAX_WEIGHT: f64 = 80.0;
const OBJECTIVE_NO_GO_PENALTY: f64 = 400.0;
const OBJECTIVE_CAUTION_PENALTY: f64 = 120.0;

/// Outcome of weather optimization, embedded in the plan summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub used: bool,
    pub provider: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub chosen_launch_utc: Option<DateTime<Utc>>,
    pub candidates_evaluated: usize,
    pub objective_score: Option<f64>,
    pub overall_decision: Option<WeatherDecision>,
    #[serde(default)]
    pub missions: Vec<MissionWeatherSchedule>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl WeatherReport {
    pub fn disabled() -> Self {
        Self {
            notes: vec!["Weather optimization disabled for this plan".to_string()],
            ..Default::default()
        }
    }

    /// Report for a run where weather could not be applied.
    pub fn unavailable(note: impl Into<String>) -> Self {
        Self {
            notes: vec![note.into()],
            ..Default::default()
        }
    }
}

/// Score and decision for a single forecast hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRisk {
    pub score: f64,
    pub decision: WeatherDecision,
}

fn ratio(value: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return if value > 0.0 { MAX_RATIO } else { 0.0 };
    }
    (value.max(0.0) / limit).min(MAX_RATIO)
}

pub fn point_risk(point: &ForecastPoint, thresholds: &WeatherThresholds) -> PointRisk {
    let wind = ratio(point.wind_speed_mps, thresholds.max_wind_mps);
    let gust = ratio(point.wind_gust_mps, thresholds.max_gust_mps);
    let precipitation = ratio(point.precipitation_probability, thresholds.max_precipitation_probability);

    let deviation = if point.temperature_c < thresholds.min_temperature_c {
        thresholds.min_temperature_c - point.temperature_c
    } else if point.temperature_c > thresholds.max_temperature_c {
        point.temperature_c - thresholds.max_temperature_c
    } else {
        0.0
    };
    let temperature_penalty = (deviation / TEMPERATURE_PENALTY_SPAN_C).min(1.0);
    let band = thresholds.max_temperature_c - thresholds.min_temperature_c;

    let raw = WIND_WEIGHT * wind
        + GUST_WEIGHT * gust
        + PRECIPITATION_WEIGHT * precipitation
        + TEMPERATURE_WEIGHT * temperature_penalty;
    let worst_ratio = wind.max(gust).max(precipitation);

    let decision = if raw >= 1.0
        || worst_ratio > 1.0 + HARD_EXCEEDANCE
        || deviation > band * HARD_EXCEEDANCE
    {
        WeatherDecision::NoGo
    } else if raw >= CAUTION_SCORE || worst_ratio > 1.0 || deviation > 0.0 {
        WeatherDecision::Caution
    } else {
        WeatherDecision::Go
    };

    PointRisk {
        score: raw.clamp(0.0, 1.0),
        decision,
    }
}

/// Points inside `[start, end]`, or the single point nearest the midpoint.
fn window_points<'a>(
    points: &'a [ForecastPoint],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<&'a ForecastPoint> {
    let inside: Vec<&ForecastPoint> = points
        .iter()
        .filter(|p| p.timestamp >= start && p.timestamp <= end)
        .collect();
    if !inside.is_empty() {
        return inside;
    }
    let midpoint = start + (end - start) / 2;
    points
        .iter()
        .min_by_key(|p| ((p.timestamp - midpoint).num_seconds().abs(), p.timestamp))
        .into_iter()
        .collect()
}

/// Risk over a mission's execution interval: `0.7 × max + 0.3 × avg`.
pub fn window_risk(
    points: &[ForecastPoint],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    thresholds: &WeatherThresholds,
) -> RiskAssessment {
    let window = window_points(points, start, end);
    let risks: Vec<PointRisk> = window.iter().map(|p| point_risk(p, thresholds)).collect();

    let sample_count = risks.len();
    let max_point_score = risks.iter().map(|r| r.score).fold(0.0, f64::max);
    let avg_point_score = if sample_count == 0 {
        0.0
    } else {
        risks.iter().map(|r| r.score).sum::<f64>() / sample_count as f64
    };
    let decision = risks.iter().map(|r| r.decision).max().unwrap_or_default();

    RiskAssessment {
        risk_score: 0.7 * max_point_score + 0.3 * avg_point_score,
        decision,
        max_point_score,
        avg_point_score,
        sample_count,
        max_wind_mps: window.iter().map(|p| p.wind_speed_mps).fold(0.0, f64::max),
        max_gust_mps: window.iter().map(|p| p.wind_gust_mps).fold(0.0, f64::max),
        max_precipitation_probability: window
            .iter()
            .map(|p| p.precipitation_probability)
            .fold(0.0, f64::max),
        min_temperature_c: window
            .iter()
            .map(|p| p.temperature_c)
            .reduce(f64::min)
            .unwrap_or_default(),
        max_temperature_c: window
            .iter()
            .map(|p| p.temperature_c)
            .reduce(f64::max)
            .unwrap_or_default(),
    }
}

/// `100 × avg + 80 × max + 400 × NO_GO count + 120 × CAUTION count`.
pub fn objective_score(risks: &[RiskAssessment]) -> f64 {
    if risks.is_empty() {
        return 0.0;
    }
    let avg = risks.iter().map(|r| r.risk_score).sum::<f64>() / risks.len() as f64;
    let max = risks.iter().map(|r| r.risk_score).fold(0.0, f64::max);
    let no_go = risks.iter().filter(|r| r.decision == WeatherDecision::NoGo).count();
    let caution = risks.iter().filter(|r| r.decision == WeatherDecision::Caution).count();
    OBJECTIVE_AVG_WEIGHT * avg
        + OBJECTIVE_MAX_WEIGHT * max
        + OBJECTIVE_NO_GO_PENALTY * no_go as f64
        + OBJECTIVE_CAUTION_PENALTY * caution as f64
}

/// Missions flown back to back from `launch`, separated by the turnaround gap.
pub fn schedule_from(
    launch: DateTime<Utc>,
    missions: &[MissionDraft],
    points: &[ForecastPoint],
    thresholds: &WeatherThresholds,
) -> Vec<MissionWeatherSchedule> {
    let turnaround = Duration::milliseconds((thresholds.turnaround_minutes * 60_000.0).round() as i64);
    let mut cursor = launch;
    missions
        .iter()
        .map(|mission| {
            let duration =
                Duration::milliseconds((mission.estimated_duration_min.max(0.0) * 60_000.0).round() as i64);
            let start = cursor;
            let end = start + duration;
            cursor = end + turnaround;
            MissionWeatherSchedule {
                mission_sequence: mission.sequence,
                start_time_utc: start,
                end_time_utc: end,
                risk: window_risk(points, start, end, thresholds),
            }
        })
        .collect()
}

/// Candidate launch times within `[now, now + lookahead]` and the forecast.
fn candidate_launches(
    snapshot: &WeatherForecastSnapshot,
    thresholds: &WeatherThresholds,
    now: DateTime<Utc>,
    notes: &mut Vec<String>,
) -> Vec<DateTime<Utc>> {
    let lookahead_end = now + Duration::hours(i64::from(thresholds.lookahead_hours));
    let horizon_end = snapshot
        .points
        .iter()
        .map(|p| p.timestamp)
        .max()
        .map_or(lookahead_end, |last| last.min(lookahead_end));

    let mut candidates: Vec<DateTime<Utc>> = snapshot
        .points
        .iter()
        .map(|p| p.timestamp)
        .filter(|t| *t >= now && *t <= lookahead_end)
        .collect();

    if let Some(preferred) = thresholds.preferred_launch_time {
        if preferred >= now && preferred <= horizon_end {
            candidates.push(preferred);
        } else {
            notes.push(format!(
                "Preferred launch {} ignored: outside the forecast horizon",
                preferred.to_rfc3339()
            ));
        }
    }

    candidates.sort();
    candidates.dedup();
    candidates
}

/// Choose the launch time that minimizes the weather objective.
///
/// Ties go to the earliest candidate.
pub fn optimize_launch_window(
    missions: &[MissionDraft],
    snapshot: &WeatherForecastSnapshot,
    thresholds: &WeatherThresholds,
    now: DateTime<Utc>,
) -> WeatherReport {
    let mut report = WeatherReport {
        provider: Some(snapshot.provider.clone()),
        fetched_at: Some(snapshot.fetched_at),
        timezone: Some(snapshot.timezone.clone()),
        ..Default::default()
    };

    if missions.is_empty() {
        report.notes.push("No missions to schedule".to_string());
        return report;
    }
    if snapshot.points.is_empty() {
        report.notes.push("Forecast contained no hourly points".to_string());
        return report;
    }

    let candidates = candidate_launches(snapshot, thresholds, now, &mut report.notes);
    report.candidates_evaluated = candidates.len();
    if candidates.is_empty() {
        report
            .notes
            .push("No forecast hours fall inside the lookahead window".to_string());
        return report;
    }

    let mut best: Option<(DateTime<Utc>, f64, Vec<MissionWeatherSchedule>)> = None;
    for launch in candidates {
        let schedule = schedule_from(launch, missions, &snapshot.points, thresholds);
        let risks: Vec<RiskAssessment> = schedule.iter().map(|s| s.risk.clone()).collect();
        let score = objective_score(&risks);
        let better = match &best {
            Some((_, best_score, _)) => score < *best_score,
            None => true,
        };
        if better {
            best = Some((launch, score, schedule));
        }
    }

    let Some((launch, score, schedule)) = best else {
        return report;
    };

    let overall = schedule
        .iter()
        .map(|s| s.risk.decision)
        .max()
        .unwrap_or_default();
    let caution = schedule.iter().filter(|s| s.risk.decision == WeatherDecision::Caution).count();
    let no_go = schedule.iter().filter(|s| s.risk.decision == WeatherDecision::NoGo).count();

    report.notes.push(format!(
        "Launch at {} selected from {} candidate times (objective {:.1})",
        launch.to_rfc3339(),
        report.candidates_evaluated,
        score
    ));
    if no_go > 0 {
        report.notes.push(format!(
            "{no_go} mission(s) fall in NO_GO conditions even in the best window"
        ));
    }
    if caution > 0 {
        report
            .notes
            .push(format!("{caution} mission(s) fly in CAUTION conditions"));
    }
    if thresholds.preferred_launch_time == Some(launch) {
        report.notes.push("Preferred launch time was the best window".to_string());
    }

    report.used = true;
    report.chosen_launch_utc = Some(launch);
    report.objective_score = Some(score);
    report.overall_decision = Some(overall);
    report.missions = schedule;
    report
}
