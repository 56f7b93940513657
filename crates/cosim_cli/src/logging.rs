//! `tracing` subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise `--quiet`/`--verbose` override the
//! configured `[log] level`.

use cosim_config::LogLevel;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::GlobalArgs;

/// Installs the global subscriber, writing to stderr. A second call is a no-op.
pub fn init_logging(global: &GlobalArgs, level: LogLevel) {
    let directive = filter_directive(global.quiet, global.verbose, level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
    if let Err(err) = installed {
        debug!(%err, "keeping the existing subscriber");
    }
}

fn filter_directive(quiet: bool, verbose: bool, level: LogLevel) -> &'static str {
    if quiet {
        LogLevel::Error.as_str()
    } else if verbose {
        level.max(LogLevel::Debug).as_str()
    } else {
        level.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_keeps_the_first_subscriber() {
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: None,
        };
        init_logging(&global, LogLevel::Info);
        init_logging(&global, LogLevel::Trace);
    }

    #[test]
    fn configured_level_by_default() {
        assert_eq!(filter_directive(false, false, LogLevel::Warn), "warn");
    }

    #[test]
    fn quiet_wins() {
        assert_eq!(filter_directive(true, true, LogLevel::Trace), "error");
    }

    #[test]
    fn verbose_raises_to_debug_but_keeps_trace() {
        assert_eq!(filter_directive(false, true, LogLevel::Info), "debug");
        assert_eq!(filter_directive(false, true, LogLevel::Trace), "trace");
    }
}
