//! Configuration types deserialized from `cosim.toml`.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// The top-level run configuration parsed from `cosim.toml`.
///
/// Every section is optional; an empty file yields [`CosimConfig::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CosimConfig {
    /// Which bench to run and for how long.
    #[serde(default)]
    pub bench: BenchConfig,
    /// Scheduler watchdog settings.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Logging defaults.
    #[serde(default)]
    pub log: LogConfig,
}

/// Bench selection and run length.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BenchConfig {
    /// Name of the bench to run.
    #[serde(default = "default_bench_name")]
    pub name: String,
    /// Upper bound on simulated ticks before the driver gives up.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            name: default_bench_name(),
            max_ticks: default_max_ticks(),
        }
    }
}

fn default_bench_name() -> String {
    "counter".to_string()
}

fn default_max_ticks() -> u64 {
    1_000
}

/// Watchdogs on the two places the scheduler can block.
///
/// Both are disabled when absent: a silent driver or a process that never
/// waits then hangs the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SchedulerSettings {
    /// How long the scheduler waits for the driver's next report.
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,
    /// How long the scheduler waits for a resumed process to suspend.
    #[serde(default)]
    pub barrier_timeout_ms: Option<u64>,
}

impl SchedulerSettings {
    /// The handshake watchdog as a [`Duration`].
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    /// The barrier watchdog as a [`Duration`].
    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout_ms.map(Duration::from_millis)
    }
}

/// Logging defaults, overridden by `RUST_LOG` and CLI flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LogConfig {
    /// The default maximum log level.
    #[serde(default)]
    pub level: LogLevel,
}

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Run-level progress.
    #[default]
    Info,
    /// Per-round scheduler activity.
    Debug,
    /// Per-process resume and suspend.
    Trace,
}

impl LogLevel {
    /// The level name as accepted by `tracing` filter directives.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CosimConfig::default();
        assert_eq!(config.bench.name, "counter");
        assert_eq!(config.bench.max_ticks, 1_000);
        assert_eq!(config.scheduler.handshake_timeout(), None);
        assert_eq!(config.scheduler.barrier_timeout(), None);
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn timeouts_convert_to_durations() {
        let settings = SchedulerSettings {
            handshake_timeout_ms: Some(250),
            barrier_timeout_ms: Some(5),
        };
        assert_eq!(settings.handshake_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(settings.barrier_timeout(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn log_level_ordering_and_display() {
        assert!(LogLevel::Error < LogLevel::Trace);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
    }
}
