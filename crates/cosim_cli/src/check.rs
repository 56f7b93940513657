//! `cosim check`: validates a configuration without running anything.

use std::error::Error;
use std::path::Path;

use cosim_config::{load_config, CosimConfig};

use crate::benches;
use crate::{load_settings, CheckArgs, GlobalArgs};

/// Runs the `cosim check` command.
///
/// Returns exit code 0 if the configuration is valid and names a bundled
/// bench, 1 otherwise.
pub fn run(args: &CheckArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = match args.path.as_deref() {
        Some(path) => load_config(Path::new(path))?,
        None => load_settings(global)?,
    };
    if benches::find(&config.bench.name).is_none() {
        eprintln!(
            "error: bench.name '{}' is not a bundled bench",
            config.bench.name
        );
        return Ok(1);
    }
    if !global.quiet {
        println!("{}", describe(&config));
    }
    Ok(0)
}

fn describe(config: &CosimConfig) -> String {
    let ms = |value: Option<u64>| value.map_or_else(|| "off".to_string(), |ms| format!("{ms}ms"));
    format!(
        "bench {} (max {} ticks), handshake timeout {}, barrier timeout {}, log level {}",
        config.bench.name,
        config.bench.max_ticks,
        ms(config.scheduler.handshake_timeout_ms),
        ms(config.scheduler.barrier_timeout_ms),
        config.log.level,
    )
}
