//! `cosim run`: executes a bundled bench and reports the run summary.

use std::error::Error;

use cosim_sched::{DriverOutcome, RunEnd, SchedulerConfig};
use tracing::info;

use crate::benches;
use crate::logging::init_logging;
use crate::{load_settings, GlobalArgs, RunArgs};

/// Runs the `cosim run` command.
///
/// Returns exit code 0 if the bench passed, 1 if the run aborted.
pub fn run(args: &RunArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = load_settings(global)?;
    init_logging(global, config.log.level);

    let name = args.bench.as_deref().unwrap_or(&config.bench.name);
    let bench = benches::find(name)
        .ok_or_else(|| format!("unknown bench '{name}' (see `cosim benches`)"))?;
    let max_ticks = args.ticks.unwrap_or(config.bench.max_ticks);
    let scheduler = SchedulerConfig {
        handshake_timeout: config.scheduler.handshake_timeout(),
        barrier_timeout: config.scheduler.barrier_timeout(),
    };

    if !global.quiet {
        eprintln!("    Running {} (up to {max_ticks} ticks)", bench.name);
    }
    info!(bench = bench.name, max_ticks, "starting bench");
    let report = benches::execute(bench, scheduler, max_ticks)?;

    match report.run {
        Ok(summary) => {
            if !global.quiet {
                let end = match summary.end {
                    RunEnd::Finished => "finished",
                    RunEnd::Exhausted => "all processes returned",
                };
                println!(
                    "{}: {end} at {} after {} ticks ({} rounds, {} processes, {} writes, {} callbacks)",
                    bench.name,
                    summary.final_time,
                    summary.ticks,
                    summary.rounds,
                    summary.processes_spawned,
                    summary.writes_flushed,
                    summary.callbacks_fired,
                );
            }
            Ok(0)
        }
        Err(err) => {
            eprintln!("error: bench '{}' aborted: {err}", bench.name);
            if let Some(DriverOutcome::TickLimit { ticks }) = report.driver {
                eprintln!("note: the driver stopped at the {ticks}-tick limit; raise it with --ticks");
            }
            Ok(1)
        }
    }
}
