//! Clap command definition.

use clap::{Arg, ArgAction, Command};

/// Build the `lockstep` command.
pub fn build_cli() -> Command {
    Command::new("lockstep")
        .about("Two-phase-locking scheduler simulator")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("schedule")
                .long("schedule")
                .short('s')
                .value_name("OPS")
                .help("Operations to run, e.g. \"w1(x) w2(y) w1(y) w2(x)\""),
        )
        .arg(
            Arg::new("max-restarts")
                .long("max-restarts")
                .value_name("N")
                .value_parser(clap::value_parser!(u32))
                .conflicts_with("unbounded")
                .help("Restarts allowed per transaction before it fails"),
        )
        .arg(
            Arg::new("unbounded")
                .long("unbounded")
                .action(ArgAction::SetTrue)
                .help("Restart transactions without limit"),
        )
        .arg(
            Arg::new("detection")
                .long("detection")
                .value_name("POLICY")
                .value_parser(["conflict", "wait-for"])
                .help("Deadlock detection policy"),
        )
        .arg(
            Arg::new("sweep")
                .long("sweep")
                .value_name("MODE")
                .value_parser(["retain", "clear-on-first"])
                .help("What the deferred sweep does with operations that still fail"),
        )
        .arg(
            Arg::new("reentrant-locks")
                .long("reentrant-locks")
                .action(ArgAction::SetTrue)
                .help("Let a transaction take a key it already holds again"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("TOML file with scheduler settings; flags override it"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the report as JSON"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Show scheduler internals"),
        )
}
