//! Bundled benches: a design model for the loopback simulator plus the
//! processes that stimulate and check it.

use std::error::Error;

use cosim_common::LogicVec;
use cosim_sched::{
    spawn_scheduler, DriverOutcome, LoopbackSim, ProcessError, RunSummary, SchedError, Scheduler,
    SchedulerConfig, Trigger,
};
use tracing::debug;

use crate::GlobalArgs;

type Bootstrap = Box<dyn FnOnce(&mut Scheduler) -> Result<(), SchedError> + Send>;

/// A named bench.
pub struct Bench {
    /// Name used on the command line and in `bench.name`.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    setup: fn(&LoopbackSim) -> Bootstrap,
}

/// Every bundled bench.
pub const BENCHES: &[Bench] = &[
    Bench {
        name: "counter",
        description: "resettable 8-bit counter checked on every rising clock edge",
        setup: counter,
    },
    Bench {
        name: "pipeline",
        description: "one process per item through stages of 1, 2 and 3 ticks",
        setup: pipeline,
    },
];

/// Looks up a bench by name.
pub fn find(name: &str) -> Option<&'static Bench> {
    BENCHES.iter().find(|bench| bench.name == name)
}

/// The outcome of a bench run, from both sides of the handshake.
pub struct BenchReport {
    /// The scheduler's result.
    pub run: Result<RunSummary, SchedError>,
    /// How the driver saw the run end, if the handshake held up.
    pub driver: Option<DriverOutcome>,
}

/// Runs `bench` on a fresh loopback simulator.
pub fn execute(
    bench: &Bench,
    config: SchedulerConfig,
    max_ticks: u64,
) -> Result<BenchReport, Box<dyn Error>> {
    let sim = LoopbackSim::new();
    let bootstrap = (bench.setup)(&sim);
    let (port, scheduler) = spawn_scheduler(sim.access(), config, bootstrap)?;
    let driver = match sim.driver().run(port, max_ticks) {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            debug!(%err, "driver stopped");
            None
        }
    };
    let run = scheduler
        .join()
        .map_err(|_| "scheduler thread panicked")?;
    Ok(BenchReport { run, driver })
}

/// Runs the `cosim benches` command.
pub fn list(global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    if !global.quiet {
        for bench in BENCHES {
            println!("{:<10} {}", bench.name, bench.description);
        }
    }
    Ok(0)
}

const COUNTER_EDGES: u32 = 16;

/// Counter with synchronous reset and enable, updated on the rising clock edge.
fn counter(sim: &LoopbackSim) -> Bootstrap {
    let clk = sim.add_signal("clk", false);
    let rst = sim.add_signal("rst", false);
    let en = sim.add_signal("en", false);
    let count = sim.add_signal("count", LogicVec::unknown(8));
    sim.set_model(move |view| {
        let high = view.get_u64(clk) == Some(1);
        view.set(clk, !high);
        if high {
            return;
        }
        if view.get_u64(rst) == Some(1) {
            view.set(count, LogicVec::from_u64(0, 8));
        } else if view.get_u64(en) == Some(1) {
            if let Some(n) = view.get_u64(count) {
                view.set(count, LogicVec::from_u64((n + 1) % 256, 8));
            }
        }
    });

    Box::new(move |sched: &mut Scheduler| {
        sched.spawn("reset", move |ctx| {
            ctx.write(rst, true)?;
            ctx.write(en, false)?;
            ctx.wait(2)?;
            ctx.write(rst, false)?;
            ctx.write(en, true)?;
            Ok(())
        })?;
        sched.spawn("checker", move |ctx| {
            let watchdog = ctx.register_callback(
                Trigger::After {
                    ticks: u64::from(COUNTER_EDGES) * 4,
                },
                |_| Err(ProcessError::failure("counter bench timed out")),
            )?;
            ctx.observe(clk)?;
            let mut expected: Option<u64> = None;
            let mut edges = 0;
            while edges < COUNTER_EDGES {
                ctx.wait(1)?;
                if !ctx.rising(clk)? {
                    continue;
                }
                if ctx.read(rst)?.to_u64() == Some(1) {
                    expected = Some(0);
                } else if ctx.read(en)?.to_u64() == Some(1) {
                    expected = expected.map(|n| (n + 1) % 256);
                }
                let got = ctx.read(count)?.to_u64();
                if got != expected {
                    return Err(ProcessError::failure(format!(
                        "count mismatch at {}: expected {expected:?}, got {got:?}",
                        ctx.time()?
                    )));
                }
                edges += 1;
            }
            ctx.cancel_callback(watchdog)?;
            ctx.finish()?;
            Ok(())
        })?;
        Ok(())
    })
}

const PIPELINE_ITEMS: u64 = 8;
const PIPELINE_STAGES: [u32; 3] = [1, 2, 3];

/// Items issued one per tick, each carried through the stages by its own process.
fn pipeline(sim: &LoopbackSim) -> Bootstrap {
    let out = sim.add_signal("out", LogicVec::from_u64(0, 8));

    Box::new(move |sched: &mut Scheduler| {
        sched.spawn("dispatch", move |ctx| {
            for item in 1..=PIPELINE_ITEMS {
                ctx.spawn(format!("item{item}"), move |ctx| {
                    for latency in PIPELINE_STAGES {
                        ctx.wait(latency)?;
                    }
                    ctx.write(out, LogicVec::from_u64(item, 8))?;
                    Ok(())
                })?;
                ctx.wait(1)?;
            }
            Ok(())
        })?;
        sched.spawn("sink", move |ctx| {
            let latency: u32 = PIPELINE_STAGES.iter().sum();
            let deadline = PIPELINE_ITEMS + u64::from(latency) + 2;
            let mut next = 1;
            while next <= PIPELINE_ITEMS {
                ctx.wait(1)?;
                if ctx.tick()? > deadline {
                    return Err(ProcessError::failure(format!(
                        "pipeline stalled waiting for item {next}"
                    )));
                }
                if !ctx.value_changed(out)? {
                    continue;
                }
                let got = ctx.read(out)?.to_u64();
                if got != Some(next) {
                    return Err(ProcessError::failure(format!(
                        "item out of order: expected {next}, got {got:?}"
                    )));
                }
                next += 1;
            }
            ctx.finish()?;
            Ok(())
        })?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_sched::RunEnd;

    #[test]
    fn find_known_and_unknown() {
        assert_eq!(find("counter").map(|b| b.name), Some("counter"));
        assert!(find("fifo").is_none());
    }

    #[test]
    fn counter_bench_passes() {
        let bench = find("counter").unwrap();
        let report = execute(bench, SchedulerConfig::default(), 1000).unwrap();
        let summary = report.run.unwrap();
        assert_eq!(summary.end, RunEnd::Finished);
        // One rising edge every other tick, the first on tick 1.
        assert_eq!(summary.ticks, u64::from(COUNTER_EDGES) * 2 - 1);
        assert!(matches!(report.driver, Some(DriverOutcome::Finished { .. })));
    }

    #[test]
    fn pipeline_bench_passes() {
        let bench = find("pipeline").unwrap();
        let report = execute(bench, SchedulerConfig::default(), 1000).unwrap();
        let summary = report.run.unwrap();
        assert_eq!(summary.end, RunEnd::Finished);
        assert_eq!(summary.processes_spawned, 2 + PIPELINE_ITEMS as usize);
    }

    #[test]
    fn tick_limit_too_small_fails_the_run() {
        let bench = find("pipeline").unwrap();
        let report = execute(bench, SchedulerConfig::default(), 3).unwrap();
        assert!(report.run.is_err());
        assert_eq!(report.driver, Some(DriverOutcome::TickLimit { ticks: 3 }));
    }
}
