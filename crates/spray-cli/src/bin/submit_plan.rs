//! Submit a spray plan to the server and poll it until it finishes.

use anyhow::{bail, Context, Result};
use clap::Parser;
use spray_cli::PlanClient;
use spray_core::SprayPlanRequest;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Create a spray plan on a running server and wait for READY or FAILED
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Spray plan server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Project to plan
    #[arg(long)]
    project: String,

    /// Plan request JSON (defaults apply to omitted fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between status polls
    #[arg(long, default_value_t = 2)]
    poll_secs: u64,

    /// Give up after this many polls
    #[arg(long, default_value_t = 150)]
    max_polls: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let client = PlanClient::new(&args.url);

    let request: SprayPlanRequest = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SprayPlanRequest::default(),
    };

    let accepted = client.submit(&args.project, &request)?;
    println!("Plan {} {}", accepted.plan_id, accepted.status);

    for _ in 0..args.max_polls {
        thread::sleep(Duration::from_secs(args.poll_secs.max(1)));
        let plan = client.fetch(&accepted.plan_id, None)?;
        let status = plan["status"].as_str().unwrap_or("UNKNOWN");
        println!("  {} {}%", status, plan["progress"]);

        match status {
            "READY" => {
                let missions = client.fetch(&accepted.plan_id, Some("missions"))?;
                println!("{}", serde_json::to_string_pretty(&plan["summary"])?);
                println!(
                    "Plan ready with {} missions",
                    missions.as_array().map(Vec::len).unwrap_or(0)
                );
                return Ok(());
            }
            "FAILED" => {
                bail!(
                    "plan failed: {}",
                    plan["error_message"].as_str().unwrap_or("no message")
                );
            }
            _ => {}
        }
    }

    bail!("plan {} did not finish after {} polls", accepted.plan_id, args.max_polls)
}
