//! Run the spray planning engine against a survey fixture, without a server.
//!
//! Prints the plan summary as JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use spray_cli::{load_forecast, load_survey, plan_survey, routes_document};
use std::path::PathBuf;

/// Plan spray missions offline from a JSON survey fixture
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Survey fixture (records, doses, layers, request)
    #[arg(long)]
    input: PathBuf,

    /// Forecast snapshot JSON; weather optimization is skipped without one
    #[arg(long)]
    forecast: Option<PathBuf>,

    /// Planning time as RFC 3339 (default: now)
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Write zones and mission routes as a feature collection to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let fixture = load_survey(&args.input)?;
    let forecast = args.forecast.as_deref().map(load_forecast).transpose()?;
    let now = args.now.unwrap_or_else(Utc::now);

    let outcome = plan_survey(&fixture, forecast, now).context("planning failed")?;

    if let Some(path) = &args.output {
        let doc = serde_json::to_string_pretty(&routes_document(&outcome))?;
        std::fs::write(path, doc).with_context(|| format!("writing {}", path.display()))?;
        eprintln!(
            "Wrote {} zones and {} missions to {}",
            outcome.zones.len(),
            outcome.missions.len(),
            path.display()
        );
    }

    println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    Ok(())
}
