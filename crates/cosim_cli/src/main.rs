//! cosim CLI: runs co-simulation benches against the loopback driver.
//!
//! Provides `cosim run` to execute a bundled bench, `cosim check` to validate
//! a `cosim.toml`, and `cosim benches` to list what is bundled.

#![warn(missing_docs)]

mod benches;
mod check;
mod logging;
mod run;

use std::path::Path;
use std::process;

use clap::{Parser, Subcommand};
use cosim_config::{load_or_default, resolve_config_path, ConfigError, CosimConfig, BOOTSTRAP_ENV};

/// cosim: a time-stepped co-simulation scheduler.
#[derive(Parser, Debug)]
#[command(name = "cosim", version, about = "Co-simulation scheduler")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `cosim.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a bundled bench on the loopback driver.
    Run(RunArgs),
    /// Validate a configuration file.
    Check(CheckArgs),
    /// List the bundled benches.
    Benches,
}

/// Arguments for the `cosim run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Bench to run (default: `bench.name` from the configuration).
    pub bench: Option<String>,

    /// Tick limit after which the driver hangs up (default: `bench.max_ticks`).
    #[arg(long)]
    pub ticks: Option<u64>,
}

/// Arguments for the `cosim check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Configuration file to check (default: the resolved configuration).
    pub path: Option<String>,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Run(ref args) => run::run(args, &global),
        Command::Check(ref args) => check::run(args, &global),
        Command::Benches => benches::list(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Loads the configuration selected by `--config`, `COSIM_BOOTSTRAP`, or
/// `./cosim.toml`, falling back to the defaults.
pub(crate) fn load_settings(global: &GlobalArgs) -> Result<CosimConfig, ConfigError> {
    let explicit = global.config.as_deref().map(Path::new);
    let bootstrap = std::env::var(BOOTSTRAP_ENV).ok();
    let dir = std::env::current_dir().map_err(ConfigError::WorkingDir)?;
    let path = resolve_config_path(explicit, bootstrap.as_deref(), &dir);
    load_or_default(path.as_deref())
}
