use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Bare numbers are seconds; anything else goes through humantime (`250ms`, `1m30s`).
fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}' ({e}; expected e.g. 10s, 250ms, 1m)"))
}

fn parse_positive(input: &str) -> Result<u64, String> {
    match input.trim().parse::<u64>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(v) => Ok(v),
        Err(e) => Err(format!("invalid number '{input}': {e}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a final summary line to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Virtual-user load generator for HTTP services",
    long_about = "surge drives many virtual users through a scripted HTTP journey, carries per-user session state between steps, and checks the aggregated latency and success figures against assertions.\n\nSimulations are described in YAML: base URL, feeder, steps, injection profile and assertions.",
    after_help = "Examples:\n  surge run demos/game_flow.yaml\n  surge run demos/game_flow.yaml --max-duration 2m --max-concurrent-users 50\n  surge run demos/game_flow.yaml --output json\n\nExit codes: 0 pass, 11 assertions failed, 30 invalid input, 40 runtime error."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a simulation file
    #[command(
        long_about = "Run a YAML simulation and evaluate its assertions.\n\nCLI flags override the matching values from the file."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the simulation (.yaml)
    pub simulation: PathBuf,

    /// Stop the run after this long (e.g. 30s, 2m); in-flight requests are recorded as failures
    #[arg(long, value_parser = parse_duration)]
    pub max_duration: Option<Duration>,

    /// Cap on simultaneously running virtual users
    #[arg(long, value_parser = parse_positive)]
    pub max_concurrent_users: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Log filter (e.g. warn, info, surge_core=debug). RUST_LOG takes precedence.
    #[arg(long, default_value = "warn", env = "SURGE_LOG")]
    pub log_level: String,
}
