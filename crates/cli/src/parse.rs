//! ArgMatches → RunPlan conversion.
//!
//! Flags override whatever the config file set; anything neither mentions
//! keeps its default.

use clap::ArgMatches;
use lockstep::{
    parse_schedule, DeadlockDetection, GrantPolicy, Operation, SchedulerConfig, Simulator,
    SweepMode,
};

/// How the report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Everything needed to run one simulation.
#[derive(Debug)]
pub struct RunPlan {
    pub config: SchedulerConfig,
    pub schedule: Vec<Operation>,
    pub output: OutputMode,
}

/// Path given with `--config`, if any.
pub fn config_path(matches: &ArgMatches) -> Option<&str> {
    matches.get_one::<String>("config").map(String::as_str)
}

/// Whether `-v` was given.
pub fn verbose(matches: &ArgMatches) -> bool {
    matches.get_flag("verbose")
}

/// Convert clap ArgMatches into a RunPlan, starting from `base`.
pub fn matches_to_plan(matches: &ArgMatches, base: SchedulerConfig) -> Result<RunPlan, String> {
    let mut config = base;

    if let Some(max) = matches.get_one::<u32>("max-restarts") {
        config = config.with_max_restarts(*max);
    }
    if matches.get_flag("unbounded") {
        config = config.unbounded();
    }
    if let Some(raw) = matches.get_one::<String>("detection") {
        let detection = raw
            .parse::<DeadlockDetection>()
            .map_err(|e| e.to_string())?;
        config = config.with_detection(detection);
    }
    if let Some(raw) = matches.get_one::<String>("sweep") {
        let mode = raw.parse::<SweepMode>().map_err(|e| e.to_string())?;
        config = config.with_sweep_mode(mode);
    }
    if matches.get_flag("reentrant-locks") {
        config = config.with_grant_policy(GrantPolicy::Reentrant);
    }

    let schedule = match matches.get_one::<String>("schedule") {
        Some(raw) => {
            let ops = parse_schedule(raw).map_err(|e| format!("Invalid schedule: {}", e))?;
            if ops.is_empty() {
                return Err("Invalid schedule: no operations".to_string());
            }
            ops
        }
        None => Simulator::default_schedule(),
    };

    let output = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    Ok(RunPlan {
        config,
        schedule,
        output,
    })
}
