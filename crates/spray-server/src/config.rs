//! Server configuration from environment.

use std::env;

pub const DEFAULT_WEATHER_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_path: String,
    pub database_max_connections: u32,
    /// Hourly forecast endpoint (Open-Meteo compatible)
    pub weather_url: String,
    pub weather_timeout_s: u64,
    /// Plans run at the same time by the worker
    pub worker_concurrency: usize,
    pub worker_queue_depth: usize,
    /// Seconds between sweeps for QUEUED plans the queue did not carry
    pub worker_sweep_interval_s: u64,
    pub log_json: bool,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().map(|s| {
        matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_port: env_parse("SPRAY_PORT").unwrap_or(3000),
            database_path: env::var("SPRAY_DATABASE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "data/spray.db".to_string()),
            database_max_connections: env_parse("SPRAY_DATABASE_MAX_CONNECTIONS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(5),
            weather_url: env::var("SPRAY_WEATHER_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_WEATHER_URL.to_string()),
            weather_timeout_s: env_parse("SPRAY_WEATHER_TIMEOUT_S")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(15),
            worker_concurrency: env_parse("SPRAY_WORKER_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(2),
            worker_queue_depth: env_parse("SPRAY_WORKER_QUEUE_DEPTH")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(64),
            worker_sweep_interval_s: env_parse("SPRAY_WORKER_SWEEP_INTERVAL_S")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(30),
            log_json: env_flag("SPRAY_LOG_JSON").unwrap_or(false),
        }
    }
}
