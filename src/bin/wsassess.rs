//! wsassess - assess a coordinate broadcast server
//!
//! Opens several WebSocket probes against the target, watches them for a
//! fixed window, and prints one line per assertion plus a summary. Exits
//! with status 1 if any assertion failed and 2 if the target was unavailable.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use wsassess::{Coordinator, Error, HarnessConfig, Target, Tolerance, ViolationBudget};

#[derive(Parser)]
#[command(name = "wsassess")]
#[command(about = "Assess a server that broadcasts {x, y} coordinates over WebSocket")]
struct Args {
    /// WebSocket endpoint the probes connect to
    #[arg(long, short, default_value = "ws://localhost:8080/path")]
    endpoint: String,

    /// Number of concurrent probes
    #[arg(long, short = 'n', default_value_t = 3, value_parser = at_least_one)]
    connections: usize,

    /// Observation window in milliseconds
    #[arg(long, default_value_t = 5000, value_parser = clap::value_parser!(u64).range(1..))]
    duration_ms: u64,

    /// Expected broadcasts per second
    #[arg(long, default_value_t = 2.0, value_parser = positive_rate)]
    rate: f64,

    /// Accepted deviation from the expected per-connection count
    #[arg(long, default_value_t = 1)]
    count_tolerance: usize,

    /// Fraction of the interval under which messages belong to one tick
    #[arg(long, default_value_t = 0.9, value_parser = unit_fraction)]
    threshold_ratio: f64,

    /// Grace period after launching the target, in milliseconds
    #[arg(long, default_value_t = 100)]
    warmup_ms: u64,

    /// Connect plus handshake timeout per probe, in milliseconds
    #[arg(long, default_value_t = 1000)]
    connect_timeout_ms: u64,

    /// Page that GET / must return (skipped if not given)
    #[arg(long)]
    page: Option<PathBuf>,

    /// Malformed payload reports before going quiet
    #[arg(long, default_value_t = 2)]
    max_malformed: u32,

    /// Out-of-bounds reports before going quiet
    #[arg(long, default_value_t = 1)]
    max_out_of_bounds: u32,

    /// Tick mismatch reports before going quiet
    #[arg(long, default_value_t = 2)]
    max_tick_mismatch: u32,

    /// Stale payload reports before going quiet
    #[arg(long, default_value_t = 3)]
    max_stale: u32,

    /// Working directory for the target command
    #[arg(long)]
    target_dir: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    /// Command that starts the target; omit to assess an already running one
    #[arg(last = true)]
    command: Vec<String>,
}

fn at_least_one(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn positive_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if rate.is_finite() && rate >= 1e-6 {
        Ok(rate)
    } else {
        Err("must be a positive number of broadcasts per second".into())
    }
}

fn unit_fraction(s: &str) -> Result<f64, String> {
    let ratio: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if ratio > 0.0 && ratio <= 1.0 {
        Ok(ratio)
    } else {
        Err("must be greater than 0 and at most 1".into())
    }
}

impl Args {
    fn harness_config(&self) -> HarnessConfig {
        let tolerance = Tolerance {
            connections: self.connections,
            observation: Duration::from_millis(self.duration_ms),
            messages_per_sec: self.rate,
            count_tolerance: self.count_tolerance,
            threshold_ratio: self.threshold_ratio,
        };
        let budget = ViolationBudget::new(
            self.max_malformed,
            self.max_out_of_bounds,
            self.max_tick_mismatch,
            self.max_stale,
        );

        let config = HarnessConfig::new(self.endpoint.clone())
            .with_tolerance(tolerance)
            .with_budget(budget)
            .with_warmup(Duration::from_millis(self.warmup_ms))
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        match &self.page {
            Some(page) => config.with_reference_page(page),
            None => config,
        }
    }

    fn target(&self) -> Target {
        let Some((program, args)) = self.command.split_first() else {
            return Target::External;
        };
        let target = Target::command(program.clone(), args.iter().cloned());
        match &self.target_dir {
            Some(dir) => target.in_dir(dir),
            None => target,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut coordinator = Coordinator::new(args.harness_config()).with_target(args.target());
    let report = match coordinator.run().await {
        Ok(report) => report,
        Err(Error::TargetUnavailable(reason)) => {
            error!(%reason, "target unavailable");
            eprintln!("target unavailable: {}", reason);
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report);
    }

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
