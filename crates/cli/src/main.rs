//! Lockstep CLI - runs a schedule through the simulator and prints the report.
//!
//! Scheduler events are logged as they happen; the report (both histories
//! and the final values) follows once every operation has finished.
//! `RUST_LOG` overrides the log filter.

mod commands;
mod parse;

use std::fs;

use lockstep::{SchedulerConfig, Simulator};
use tracing::error;
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use parse::{config_path, matches_to_plan, verbose, OutputMode};

fn main() {
    let matches = build_cli().get_matches();
    let json = matches.get_flag("json");
    init_tracing(verbose(&matches), json);

    let base = match config_path(&matches).map(load_config).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("(error) {}", e);
            return;
        }
    };

    let plan = match matches_to_plan(&matches, base) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("(error) {}", e);
            return;
        }
    };

    let sim = Simulator::builder().config(plan.config).build();
    let report = match sim.run(&plan.schedule) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "run rejected");
            eprintln!("(error) {}", e);
            return;
        }
    };

    match plan.output {
        OutputMode::Human => print!("{}", report.render()),
        OutputMode::Json => match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("(error) {}", e),
        },
    }
}

fn load_config(path: &str) -> Result<SchedulerConfig, String> {
    let source =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config {}: {}", path, e))?;
    SchedulerConfig::from_toml_str(&source).map_err(|e| format!("{} ({})", e, path))
}

/// Console events go to stdout, except in JSON mode where stdout carries
/// the report.
fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time();

    if json {
        builder.with_writer(std::io::stderr).init();
    } else {
        builder.init();
    }
}
